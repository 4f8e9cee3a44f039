use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep};

/// Polls `condition` every `poll` until it holds or `timeout` elapses.
/// Always returns; `false` means the caller takes its fallback path.
pub async fn wait_for<F, Fut>(timeout: Duration, poll: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if condition().await {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        sleep(poll.min(deadline - now)).await;
    }
}

/// Like [`wait_for`] but counted in attempts: `attempts` checks spaced by
/// `interval`, the first one immediate.
pub async fn poll_attempts<F, Fut, T>(attempts: u32, interval: Duration, mut check: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    for attempt in 0..attempts {
        if attempt > 0 {
            sleep(interval).await;
        }
        if let Some(found) = check().await {
            return Some(found);
        }
    }
    None
}
