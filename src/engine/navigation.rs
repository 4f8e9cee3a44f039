use std::sync::Arc;
use tokio::time::sleep;
use tracing::debug;

use super::state::Visit;
use super::EngineContext;
use super::matching::Strategy;
use super::wait::wait_for;
use crate::models::{PageKind, VehicleCategory};
use crate::page::{ControlInfo, ControlScope, PageAdapter};
use crate::utils::error::{AppError, Result};

/// Performs the one action that moves each preliminary page forward.
#[derive(Clone)]
pub struct NavigationDriver {
    ctx: Arc<EngineContext>,
}

fn icon_strategy(icon: &'static str) -> Strategy<'static, ControlInfo> {
    Strategy::new("category-icon", move |c: &ControlInfo| c.has_icon(icon))
}

fn label_strategy(label: &'static str) -> Strategy<'static, ControlInfo> {
    Strategy::new("exact-label", move |c: &ControlInfo| c.text == label)
}

async fn category_controls_present(page: &dyn PageAdapter, category: VehicleCategory) -> bool {
    let icon = [icon_strategy(category.icon_class())];
    let label = [label_strategy(category.label())];

    matches!(page.find_control(ControlScope::Buttons, &icon).await, Ok(Some(_)))
        || matches!(page.find_control(ControlScope::Labels, &label).await, Ok(Some(_)))
}

impl NavigationDriver {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    /// Clicks the first schedule row and checks that the page moved on,
    /// clicking again while it has not. Ends quietly once `visit` is over.
    pub async fn advance_schedule(&self, visit: Visit) -> Result<()> {
        let timings = &self.ctx.timings;
        let mut retries: u32 = 0;

        loop {
            let rows = self.ctx.page.controls(ControlScope::ScheduleRows).await?;
            let Some(row) = rows.into_iter().next() else {
                self.ctx.activity.error("No schedules available");
                return Err(AppError::not_found("schedule row"));
            };

            self.ctx.activity.info("Opening schedule");
            self.ctx.page.click(&row.handle).await?;

            sleep(timings.schedule_verify_delay()).await;
            if !self.ctx.is_current_visit(visit) {
                debug!("Schedule visit ended, not retrying");
                return Ok(());
            }

            match self.ctx.page.classify_page().await {
                Ok(PageKind::Schedule) => {}
                Ok(kind) => {
                    debug!("Schedule advanced to {}", kind);
                    return Ok(());
                }
                Err(e) => {
                    // Mid-navigation reads fail; the page is on its way out.
                    debug!("Schedule check after click failed: {}", e);
                    return Ok(());
                }
            }

            retries += 1;
            if let Some(max) = timings.max_schedule_retries {
                if retries > max {
                    self.ctx
                        .activity
                        .error(format!("Schedule did not advance after {} retries", max));
                    return Err(AppError::timeout(
                        "schedule page to advance",
                        timings.schedule_verify_delay_ms * u64::from(retries),
                    ));
                }
            }
            self.ctx
                .activity
                .error(format!("Schedule click did not advance, retrying ({})", retries));
        }
    }

    /// Waits for the category buttons, then clicks the configured one by its
    /// icon, falling back to its exact label.
    pub async fn select_category(&self, visit: Visit, category: VehicleCategory) -> Result<()> {
        let timings = &self.ctx.timings;
        let label = category.label();
        self.ctx.activity.info(format!("Selecting {}", label));

        let page = self.ctx.page.clone();
        let ready = wait_for(timings.category_wait(), timings.readiness_poll(), || {
            let page = page.clone();
            async move { category_controls_present(page.as_ref(), category).await }
        })
        .await;
        if !ready {
            self.ctx.activity.info(format!(
                "Category controls not visible after {}ms, trying anyway",
                timings.category_wait_ms
            ));
        }
        if !self.ctx.is_current_visit(visit) {
            return Ok(());
        }

        let by_icon = [icon_strategy(category.icon_class())];
        if let Some(button) = page.find_control(ControlScope::Buttons, &by_icon).await? {
            page.click(&button.handle).await?;
            return Ok(());
        }

        let by_label = [label_strategy(label)];
        for scope in [ControlScope::Labels, ControlScope::Buttons] {
            if let Some(control) = page.find_control(scope, &by_label).await? {
                page.click(&control.handle).await?;
                return Ok(());
            }
        }

        self.ctx.activity.error("Vehicle category button not found");
        Err(AppError::not_found(format!("{} category control", label)))
    }
}
