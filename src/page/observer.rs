use async_trait::async_trait;
use futures::stream::{self, Stream};
use headless_chrome::Tab;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

use crate::utils::error::{AppError, Result};

/// Source of "the page changed" notifications.
#[async_trait]
pub trait ChangeObserver: Send + Sync {
    /// Resolves once the page has changed since the previous call.
    async fn next_change(&self) -> Result<()>;
}

/// Endless stream of change notifications. Observer errors are logged and
/// skipped; a page in the middle of navigating fails a few reads.
pub fn page_changes<O>(observer: Arc<O>) -> impl Stream<Item = ()> + Send
where
    O: ChangeObserver + ?Sized + 'static,
{
    stream::unfold(observer, |observer| async move {
        loop {
            match observer.next_change().await {
                Ok(()) => return Some(((), observer)),
                Err(e) => warn!("Change observer error: {}", e),
            }
        }
    })
}

/// Installs a MutationObserver counter in the page (a fresh document reports
/// -1) and polls it.
const MUTATION_COUNTER_SCRIPT: &str = r#"(function() {
    if (typeof window.__sniperMutations !== 'number') {
        window.__sniperMutations = 0;
        new MutationObserver(() => { window.__sniperMutations += 1; })
            .observe(document.body || document.documentElement, { childList: true, subtree: true });
        return -1;
    }
    return window.__sniperMutations;
})()"#;

pub struct ChromeChangeObserver {
    tab: Arc<Tab>,
    interval: Duration,
    last_seen: Mutex<Option<i64>>,
}

impl ChromeChangeObserver {
    pub fn new(tab: Arc<Tab>, interval: Duration) -> Self {
        Self {
            tab,
            interval,
            last_seen: Mutex::new(None),
        }
    }

    async fn read_counter(&self) -> Result<i64> {
        let tab = self.tab.clone();
        let value = tokio::task::spawn_blocking(move || tab.evaluate(MUTATION_COUNTER_SCRIPT, false))
            .await
            .map_err(|e| AppError::Browser(format!("Observer task failed: {}", e)))?
            .map_err(|e| AppError::TransientPage(e.to_string()))?
            .value;

        value
            .and_then(|v| v.as_i64())
            .ok_or_else(|| AppError::TransientPage("mutation counter unavailable".to_string()))
    }

    fn record(&self, counter: i64) -> bool {
        let mut last_seen = self.last_seen.lock().unwrap_or_else(|e| e.into_inner());
        let changed = counter < 0 || *last_seen != Some(counter);
        *last_seen = Some(counter.max(0));
        changed
    }
}

#[async_trait]
impl ChangeObserver for ChromeChangeObserver {
    async fn next_change(&self) -> Result<()> {
        loop {
            tokio::time::sleep(self.interval).await;
            let counter = self.read_counter().await?;
            if self.record(counter) {
                debug!("Page mutation counter at {}", counter);
                return Ok(());
            }
        }
    }
}
