use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::debug;

use super::orchestrator::Orchestrator;
use super::state::TimerHandle;
use super::{EngineContext, METRIC_WATCHDOG_RELOADS};
use crate::models::PageKind;

/// What a single watchdog tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogTick {
    /// The run this watchdog belongs to is over.
    Stopped,
    Idle,
    Reloaded,
}

/// Forces a reload when the workflow sits on a preliminary page too long.
#[derive(Clone)]
pub struct Watchdog {
    ctx: Arc<EngineContext>,
}

impl Watchdog {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    /// Starts the recurring check for `generation`, replacing any previous
    /// watchdog.
    pub fn arm(&self, generation: u64) {
        let period = self.ctx.timings.watchdog_interval();
        let watchdog = self.clone();
        let handle = tokio::spawn(async move { watchdog.run(generation, period).await });

        let mut state = self.ctx.state();
        if state.is_current(generation) {
            if let Some(previous) = state.watchdog_timer.replace(TimerHandle::new(handle)) {
                previous.cancel();
            }
        } else {
            handle.abort();
        }
    }

    async fn run(self, generation: u64, period: Duration) {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if self.tick(generation).await == WatchdogTick::Stopped {
                break;
            }
        }
    }

    pub async fn tick(&self, generation: u64) -> WatchdogTick {
        let stuck_threshold = self.ctx.timings.stuck_threshold();
        let (kind, elapsed) = {
            let state = self.ctx.state();
            if !state.is_current(generation) {
                return WatchdogTick::Stopped;
            }
            if state.form_lock_active || state.current_page_kind == Some(PageKind::Listing) {
                return WatchdogTick::Idle;
            }
            (state.current_page_kind, state.last_page_change_at.elapsed())
        };
        if elapsed <= stuck_threshold {
            return WatchdogTick::Idle;
        }

        // A missed change signal would leave a stale kind behind.
        match self.ctx.page.classify_page().await {
            Ok(PageKind::Listing) => {
                debug!("Watchdog found the listing behind a stale page kind");
                return WatchdogTick::Idle;
            }
            Ok(_) => {}
            Err(e) => debug!("Watchdog classification failed: {}", e),
        }

        {
            let state = self.ctx.state();
            if !state.is_current(generation) {
                return WatchdogTick::Stopped;
            }
            if state.form_lock_active || state.current_page_kind == Some(PageKind::Listing) {
                return WatchdogTick::Idle;
            }
        }

        let kind = kind.unwrap_or(PageKind::Unknown);
        self.ctx
            .activity
            .error(format!("Stuck on page {} for {}s", kind, elapsed.as_secs()));
        self.ctx.activity.info("Forcing page reload...");

        if let Err(e) = self.ctx.page.reload().await {
            self.ctx.report("Watchdog reload", &e);
            return WatchdogTick::Idle;
        }
        metrics::counter!(METRIC_WATCHDOG_RELOADS).increment(1);

        {
            let mut state = self.ctx.state();
            if !state.is_current(generation) {
                return WatchdogTick::Stopped;
            }
            state.mark_new_visit();
        }
        Orchestrator::new(self.ctx.clone()).notify_page_changed().await;
        WatchdogTick::Reloaded
    }
}
