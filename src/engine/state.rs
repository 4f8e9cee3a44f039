use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::models::{EngineConfig, PageKind};

/// An armed recurring task. Cancelling aborts it, so no further tick runs.
#[derive(Debug)]
pub struct TimerHandle(JoinHandle<()>);

impl TimerHandle {
    pub fn new(handle: JoinHandle<()>) -> Self {
        Self(handle)
    }

    pub fn cancel(self) {
        self.0.abort();
    }
}

/// The poll slot. `Arming` is held while the first check runs so a second
/// `start` stays a no-op, and a teardown during that window wins over the
/// pending arm.
#[derive(Debug)]
pub enum PollTimer {
    Arming,
    Armed(TimerHandle),
}

impl PollTimer {
    fn cancel(self) {
        if let PollTimer::Armed(handle) = self {
            handle.cancel();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionState {
    #[default]
    Idle,
    ButtonSearch,
    FormLoadWait,
    Filling,
    ColorWait,
    SubmitSearch,
    AutoSubmitted,
    AwaitingManual,
    Failed,
}

/// Identifies one page visit of one run. Drivers dispatched for a visit
/// stop once the page moves on or is reloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Visit {
    pub generation: u64,
    pub id: u64,
}

#[derive(Debug)]
pub struct RunState {
    pub config: EngineConfig,
    pub running: bool,
    /// Bumped by every start; work scheduled by an older run checks it and
    /// drops out.
    pub generation: u64,
    pub current_page_kind: Option<PageKind>,
    pub last_page_change_at: Instant,
    /// Bumped on every kind change and every forced new visit.
    pub visit_id: u64,
    pub page_handled_for_this_visit: bool,
    pub monitor_in_flight: bool,
    pub poll_timer: Option<PollTimer>,
    pub watchdog_timer: Option<TimerHandle>,
    pub form_lock_active: bool,
    pub acquisition: AcquisitionState,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            config: EngineConfig {
                active: false,
                ..Default::default()
            },
            running: false,
            generation: 0,
            current_page_kind: None,
            last_page_change_at: Instant::now(),
            visit_id: 0,
            page_handled_for_this_visit: false,
            monitor_in_flight: false,
            poll_timer: None,
            watchdog_timer: None,
            form_lock_active: false,
            acquisition: AcquisitionState::Idle,
        }
    }
}

impl RunState {
    pub fn is_current(&self, generation: u64) -> bool {
        self.running && self.generation == generation
    }

    pub fn current_visit(&self) -> Visit {
        Visit {
            generation: self.generation,
            id: self.visit_id,
        }
    }

    pub fn is_current_visit(&self, visit: Visit) -> bool {
        self.is_current(visit.generation) && self.visit_id == visit.id
    }

    /// Resets per-run state for a new start and returns its generation.
    pub fn begin_run(&mut self, config: EngineConfig) -> u64 {
        self.teardown_timers();
        self.config = config;
        self.running = true;
        self.generation += 1;
        self.mark_new_visit();
        self.monitor_in_flight = false;
        self.form_lock_active = false;
        self.acquisition = AcquisitionState::Idle;
        self.generation
    }

    pub fn teardown_timers(&mut self) {
        if let Some(poll) = self.poll_timer.take() {
            poll.cancel();
        }
        if let Some(watchdog) = self.watchdog_timer.take() {
            watchdog.cancel();
        }
    }

    /// Stops the run. Safe to call any number of times.
    pub fn halt(&mut self) {
        self.teardown_timers();
        self.running = false;
        self.monitor_in_flight = false;
    }

    /// Forgets the current page so the next classification counts as a
    /// fresh visit.
    pub fn mark_new_visit(&mut self) {
        self.visit_id += 1;
        self.current_page_kind = None;
        self.page_handled_for_this_visit = false;
        self.last_page_change_at = Instant::now();
    }

    /// Records a classification. Returns true when the kind changed, which
    /// also resets the handled flag.
    pub fn observe_page_kind(&mut self, kind: PageKind) -> bool {
        if self.current_page_kind == Some(kind) {
            return false;
        }
        self.current_page_kind = Some(kind);
        self.visit_id += 1;
        self.page_handled_for_this_visit = false;
        self.last_page_change_at = Instant::now();
        true
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            running: self.running,
            generation: self.generation,
            current_page_kind: self.current_page_kind,
            page_handled_for_this_visit: self.page_handled_for_this_visit,
            monitor_in_flight: self.monitor_in_flight,
            poll_timer_armed: matches!(self.poll_timer, Some(PollTimer::Armed(_))),
            watchdog_armed: self.watchdog_timer.is_some(),
            form_lock_active: self.form_lock_active,
            acquisition: self.acquisition,
        }
    }
}

/// Point-in-time copy of the run state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub running: bool,
    pub generation: u64,
    pub current_page_kind: Option<PageKind>,
    pub page_handled_for_this_visit: bool,
    pub monitor_in_flight: bool,
    pub poll_timer_armed: bool,
    pub watchdog_armed: bool,
    pub form_lock_active: bool,
    pub acquisition: AcquisitionState,
}

impl EngineStatus {
    /// Stopped runs hold no timers and no scan.
    pub fn is_quiescent(&self) -> bool {
        !self.running && !self.poll_timer_armed && !self.watchdog_armed && !self.monitor_in_flight
    }
}
