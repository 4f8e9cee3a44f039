//! Entry point of the engine: the start/stop commands and page-change
//! handling. Each page visit is dispatched to at most one driver.

use futures::{Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::debug;

use super::navigation::NavigationDriver;
use super::polling::PollingScheduler;
use super::state::{EngineStatus, Visit};
use super::watchdog::Watchdog;
use super::EngineContext;
use crate::models::{EngineConfig, PageKind};

#[derive(Clone)]
pub struct Orchestrator {
    ctx: Arc<EngineContext>,
}

impl Orchestrator {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.ctx
    }

    pub fn status(&self) -> EngineStatus {
        self.ctx.status()
    }

    /// Captures `config`, resets the run state and arms the watchdog. The
    /// current page is handled after the start settle delay. Returns the new
    /// run's generation.
    pub fn start(&self, config: EngineConfig) -> u64 {
        let generation = self.ctx.state().begin_run(config);
        self.ctx.activity.info("Engine started");
        Watchdog::new(self.ctx.clone()).arm(generation);

        let orchestrator = self.clone();
        let settle = self.ctx.timings.start_settle();
        tokio::spawn(async move {
            sleep(settle).await;
            if let Some(dispatch) = orchestrator.handle_page_change(generation, Duration::ZERO).await {
                let _ = dispatch.await;
            }
        });
        generation
    }

    /// Tears down both timers and ends the run. Safe to call at any time.
    pub fn stop(&self) {
        let was_running = {
            let mut state = self.ctx.state();
            let was_running = state.running;
            state.halt();
            was_running
        };
        if was_running {
            self.ctx.activity.info("Engine stopped");
        }
    }

    /// Handles an external page-change signal. Returns the scheduled
    /// dispatch, if this visit still needed one.
    pub async fn notify_page_changed(&self) -> Option<JoinHandle<()>> {
        let generation = self.ctx.active_generation()?;
        self.handle_page_change(generation, self.ctx.timings.dispatch_settle())
            .await
    }

    /// Forwards every change from `changes` until the stream ends.
    pub async fn run_observer<S>(&self, changes: S)
    where
        S: Stream<Item = ()> + Send,
    {
        let mut changes = std::pin::pin!(changes);
        while changes.next().await.is_some() {
            self.notify_page_changed().await;
        }
    }

    async fn handle_page_change(&self, generation: u64, settle: Duration) -> Option<JoinHandle<()>> {
        let kind = match self.ctx.page.classify_page().await {
            Ok(kind) => kind,
            Err(e) => {
                self.ctx.report("Page classification", &e);
                return None;
            }
        };

        let visit = {
            let mut state = self.ctx.state();
            if !state.is_current(generation) {
                return None;
            }
            if state.observe_page_kind(kind) {
                debug!("Page kind is now {}", kind);
            }
            if state.page_handled_for_this_visit {
                return None;
            }
            state.page_handled_for_this_visit = true;
            state.current_visit()
        };

        let orchestrator = self.clone();
        Some(tokio::spawn(async move {
            if !settle.is_zero() {
                sleep(settle).await;
            }
            {
                let state = orchestrator.ctx.state();
                // A newer change owns the page now.
                if !state.is_current_visit(visit) || state.current_page_kind != Some(kind) {
                    return;
                }
            }
            orchestrator.dispatch(visit, kind).await;
        }))
    }

    async fn dispatch(&self, visit: Visit, kind: PageKind) {
        match kind {
            PageKind::Listing => {
                self.ctx.activity.info("Listing page detected");
                PollingScheduler::new(self.ctx.clone()).start(visit.generation).await;
            }
            PageKind::CategorySelect => {
                self.ctx.activity.info("Category page detected");
                let category = self.ctx.config().vehicle_category;
                let driver = NavigationDriver::new(self.ctx.clone());
                if let Err(e) = driver.select_category(visit, category).await {
                    self.ctx.report("Category selection", &e);
                }
            }
            PageKind::Schedule => {
                self.ctx.activity.info("Schedule page detected");
                let driver = NavigationDriver::new(self.ctx.clone());
                if let Err(e) = driver.advance_schedule(visit).await {
                    self.ctx.report("Schedule advance", &e);
                }
            }
            PageKind::CompletionForm | PageKind::Unknown => {
                debug!("Nothing to drive on {} page", kind);
            }
        }
    }
}
