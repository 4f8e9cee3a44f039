//! Reload-and-recheck cadence for the listing page.
//!
//! A full page reload is how the next poll happens. The recurring tick is the
//! only thing that reloads while monitoring; it re-reads the run state on
//! every tick and stops itself once the run it belongs to is gone.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::debug;

use super::monitor::{ResourceMonitor, ScanOutcome};
use super::state::{PollTimer, TimerHandle};
use super::wait::wait_for;
use super::{EngineContext, METRIC_POLLS, METRIC_RELOADS};
use crate::models::{ListingEntry, PageKind};

#[derive(Clone)]
pub struct PollingScheduler {
    ctx: Arc<EngineContext>,
}

impl PollingScheduler {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    /// Runs the first check and arms the poll timer. A no-op when the run is
    /// gone or a poll timer already exists.
    pub async fn start(&self, generation: u64) -> ScanOutcome {
        {
            let mut state = self.ctx.state();
            if !state.is_current(generation) || state.poll_timer.is_some() {
                return ScanOutcome::Skipped;
            }
            state.poll_timer = Some(PollTimer::Arming);
        }
        self.ctx.activity.info("Monitoring started");

        let outcome = self.check().await;

        let mut state = self.ctx.state();
        // A teardown while the first check ran emptied the slot; it stays empty.
        if state.is_current(generation) && matches!(state.poll_timer, Some(PollTimer::Arming)) {
            let period = state.config.poll_interval;
            let scheduler = self.clone();
            let handle = tokio::spawn(async move { scheduler.tick_loop(generation, period).await });
            state.poll_timer = Some(PollTimer::Armed(TimerHandle::new(handle)));
            debug!("Poll timer armed every {:?}", period);
        }
        outcome
    }

    async fn tick_loop(self, generation: u64, period: Duration) {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if !self.tick(generation).await {
                break;
            }
        }
    }

    /// One poll tick. Returns false once the timer should stop.
    async fn tick(&self, generation: u64) -> bool {
        {
            let mut state = self.ctx.state();
            if !state.is_current(generation) {
                if state.generation == generation {
                    state.poll_timer = None;
                }
                return false;
            }
            if matches!(state.current_page_kind, Some(kind) if kind != PageKind::Listing) {
                state.poll_timer = None;
                drop(state);
                self.ctx.activity.info("Polling stopped: left the listing");
                return false;
            }
            if state.form_lock_active {
                drop(state);
                self.ctx.activity.info("Reload blocked: form in progress");
                return true;
            }
        }

        self.ctx.activity.info("Reloading page...");
        if let Err(e) = self.ctx.page.reload().await {
            self.ctx.report("Page reload", &e);
            return true;
        }
        metrics::counter!(METRIC_RELOADS).increment(1);

        // Detached: a win tears this timer down, which must not cut the
        // check short.
        let scheduler = self.clone();
        tokio::spawn(async move {
            if scheduler.ctx.is_current(generation) {
                scheduler.check().await;
            }
        });
        true
    }

    async fn check(&self) -> ScanOutcome {
        self.wait_for_listing().await;
        metrics::counter!(METRIC_POLLS).increment(1);
        ResourceMonitor::new(self.ctx.clone()).check_availability().await
    }

    /// Waits until the listing shows at least one row with a readable count.
    async fn wait_for_listing(&self) {
        let timings = &self.ctx.timings;
        let page = &self.ctx.page;
        let ready = wait_for(timings.listing_wait(), timings.readiness_poll(), || async {
            match page.list_rows().await {
                Ok(rows) => rows.iter().any(|row| {
                    ListingEntry::from_raw(row.name.as_deref(), row.available_text.as_deref()).is_some()
                }),
                Err(_) => false,
            }
        })
        .await;

        if !ready {
            self.ctx.activity.info(format!(
                "Listing data not visible after {}ms, checking anyway",
                timings.listing_wait_ms
            ));
        }
    }
}
