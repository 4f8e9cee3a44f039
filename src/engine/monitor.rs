use std::sync::Arc;
use tracing::{info, warn};

use super::acquisition::AcquisitionEngine;
use super::{EngineContext, METRIC_AVAILABILITY_EVENTS};
use crate::models::{AvailabilityEvent, EngineConfig, ListingEntry, PageKind};
use crate::notify::AvailabilityNotice;
use crate::utils::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Another scan was in flight, the engine is stopped, or the page is
    /// not the listing.
    Skipped,
    NoAvailability { entries: Vec<ListingEntry> },
    Found(AvailabilityEvent),
    Failed(String),
}

/// Scans the listing and raises the availability event.
#[derive(Clone)]
pub struct ResourceMonitor {
    ctx: Arc<EngineContext>,
}

impl ResourceMonitor {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    /// One scan of the listing. Concurrent calls are rejected while a scan
    /// is in flight.
    pub async fn check_availability(&self) -> ScanOutcome {
        let generation = {
            let mut state = self.ctx.state();
            if !state.running || state.monitor_in_flight {
                return ScanOutcome::Skipped;
            }
            state.monitor_in_flight = true;
            state.generation
        };

        let outcome = match self.scan(generation).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.ctx.report("Availability check", &e);
                ScanOutcome::Failed(e.to_string())
            }
        };

        {
            let mut state = self.ctx.state();
            if state.generation == generation {
                state.monitor_in_flight = false;
            }
        }
        outcome
    }

    async fn scan(&self, generation: u64) -> Result<ScanOutcome> {
        if self.ctx.page.classify_page().await? != PageKind::Listing {
            return Ok(ScanOutcome::Skipped);
        }

        let rows = self.ctx.page.list_rows().await?;
        let config = self.ctx.config();
        let mut entries = Vec::new();

        for row in rows {
            let Some(entry) =
                ListingEntry::from_raw(row.name.as_deref(), row.available_text.as_deref())
            else {
                continue;
            };
            if !config.matches_target(&entry.name) {
                continue;
            }

            // First available row in render order wins.
            if entry.available_count > 0 {
                let is_priority = config.is_priority(&entry.name);
                let event = AvailabilityEvent { entry, is_priority };
                if !self.claim(generation) {
                    return Ok(ScanOutcome::Skipped);
                }
                self.on_available(&event, &config, generation).await;
                return Ok(ScanOutcome::Found(event));
            }
            entries.push(entry);
        }

        if !entries.is_empty() {
            info!("Monitored parkings:");
            for entry in &entries {
                info!("  - {}: {} available", entry.name, entry.available_count);
            }
        }
        Ok(ScanOutcome::NoAvailability { entries })
    }

    /// Ends the run before anything reacts to the event. Both timers go and
    /// the engine reads as idle while notifiers are still sending. Fails if
    /// the run already ended.
    fn claim(&self, generation: u64) -> bool {
        let mut state = self.ctx.state();
        if !state.is_current(generation) {
            return false;
        }
        state.teardown_timers();
        state.running = false;
        state.monitor_in_flight = false;
        true
    }

    async fn on_available(&self, event: &AvailabilityEvent, config: &EngineConfig, generation: u64) {
        let tag = if event.is_priority {
            "[PRIORITY]"
        } else {
            "[MANUAL REVIEW]"
        };
        self.ctx.activity.info("Polling stopped: space found");
        self.ctx
            .activity
            .info(format!("Space found: {} {}", event.entry.name, tag));
        metrics::counter!(METRIC_AVAILABILITY_EVENTS).increment(1);

        AcquisitionEngine::new(self.ctx.clone()).spawn(event.clone(), generation);

        self.notify(event, config).await;
        self.ctx
            .activity
            .availability(&event.entry.name, event.entry.available_count);
    }

    async fn notify(&self, event: &AvailabilityEvent, config: &EngineConfig) {
        let notice = AvailabilityNotice::new(event, config.notify_url.clone());
        for notifier in &self.ctx.notifiers {
            match notifier.notify(&notice).await {
                Ok(result) if result.success => {}
                Ok(result) => {
                    let reason = result.error.unwrap_or_default();
                    warn!("Notifier {} failed: {}", notifier.name(), reason);
                    self.ctx
                        .activity
                        .info(format!("Notification via {} failed: {}", notifier.name(), reason));
                }
                Err(e) => self.ctx.report(&format!("Notification via {}", notifier.name()), &e),
            }
        }
    }
}
