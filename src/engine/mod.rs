//! The navigation and monitoring state machine.
//!
//! All components share one [`EngineContext`]: the page adapter, the
//! notifiers, the activity log and the [`state::RunState`] behind a mutex.
//! The mutex is never held across an await; every timer tick and delayed
//! dispatch re-reads the state and checks its run generation first.

pub mod acquisition;
pub mod classifier;
pub mod matching;
pub mod monitor;
pub mod navigation;
pub mod orchestrator;
pub mod polling;
pub mod state;
pub mod wait;
pub mod watchdog;

use std::sync::{Arc, Mutex, MutexGuard};

use crate::activity::ActivityLog;
use crate::config::{EngineTimings, SnapshotConfig};
use crate::models::EngineConfig;
use crate::notify::AvailabilityNotifier;
use crate::page::PageAdapter;
use crate::utils::error::AppError;

pub use acquisition::AcquisitionEngine;
pub use monitor::{ResourceMonitor, ScanOutcome};
pub use navigation::NavigationDriver;
pub use orchestrator::Orchestrator;
pub use polling::PollingScheduler;
pub use state::{AcquisitionState, EngineStatus, RunState, Visit};
pub use watchdog::Watchdog;

pub const METRIC_POLLS: &str = "sniper_polls_total";
pub const METRIC_RELOADS: &str = "sniper_reloads_total";
pub const METRIC_WATCHDOG_RELOADS: &str = "sniper_watchdog_reloads_total";
pub const METRIC_AVAILABILITY_EVENTS: &str = "sniper_availability_events_total";
pub const METRIC_AUTO_SUBMISSIONS: &str = "sniper_auto_submissions_total";

pub struct EngineContext {
    pub page: Arc<dyn PageAdapter>,
    pub notifiers: Vec<Arc<dyn AvailabilityNotifier>>,
    pub activity: ActivityLog,
    pub timings: EngineTimings,
    pub snapshots: SnapshotConfig,
    state: Mutex<RunState>,
}

impl EngineContext {
    pub fn new(page: Arc<dyn PageAdapter>, activity: ActivityLog, timings: EngineTimings) -> Self {
        Self {
            page,
            notifiers: Vec::new(),
            activity,
            timings,
            snapshots: SnapshotConfig {
                enabled: false,
                ..Default::default()
            },
            state: Mutex::new(RunState::default()),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn AvailabilityNotifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    pub fn with_snapshots(mut self, snapshots: SnapshotConfig) -> Self {
        self.snapshots = snapshots;
        self
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Locks the run state. A panicked holder does not poison the engine.
    pub fn state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn status(&self) -> EngineStatus {
        self.state().status()
    }

    pub fn config(&self) -> EngineConfig {
        self.state().config.clone()
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.state().is_current(generation)
    }

    pub fn is_current_visit(&self, visit: Visit) -> bool {
        self.state().is_current_visit(visit)
    }

    /// Generation of the active run, if any.
    pub fn active_generation(&self) -> Option<u64> {
        let state = self.state();
        state.running.then_some(state.generation)
    }

    /// Logs a failed action. Critical failures also get an error entry.
    pub fn report(&self, action: &str, err: &AppError) {
        self.activity.info(format!("{} failed: {}", action, err));
        if err.is_critical() {
            self.activity.error(err.to_string());
        }
    }
}
