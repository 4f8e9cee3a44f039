use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use parking_sniper::activity::{ActivityLog, LogLine};
use parking_sniper::engine::{AcquisitionState, ResourceMonitor, ScanOutcome};
use parking_sniper::models::{EngineConfig, VehicleProfile};
use parking_sniper::notify::{
    AvailabilityNotice, AvailabilityNotifier, NotificationResult, PageAlertNotifier,
};
use parking_sniper::page::ElementHandle;
use parking_sniper::page::snapshot::{BUTTON_SELECTOR, SELECT_SELECTOR, TEXT_INPUT_SELECTOR};
use parking_sniper::Result;

use super::*;

#[derive(Default)]
struct RecordingNotifier {
    notices: Mutex<Vec<AvailabilityNotice>>,
}

impl RecordingNotifier {
    fn notices(&self) -> Vec<AvailabilityNotice> {
        self.notices.lock().unwrap().clone()
    }
}

#[async_trait]
impl AvailabilityNotifier for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    async fn notify(&self, notice: &AvailabilityNotice) -> Result<NotificationResult> {
        self.notices.lock().unwrap().push(notice.clone());
        Ok(NotificationResult::delivered())
    }
}

fn profile_config() -> EngineConfig {
    EngineConfig {
        poll_interval: Duration::from_secs(10),
        vehicle_profile: VehicleProfile {
            plate: "P123ABC".to_string(),
            brand: "Toyota".to_string(),
            model: "2019".to_string(),
            color: "Rojo".to_string(),
        },
        ..Default::default()
    }
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<LogLine>) -> Vec<LogLine> {
    let mut lines = Vec::new();
    while let Ok(line) = rx.try_recv() {
        lines.push(line);
    }
    lines
}

fn select(index: usize) -> ElementHandle {
    ElementHandle::new(SELECT_SELECTOR, index)
}

fn input(index: usize) -> ElementHandle {
    ElementHandle::new(TEXT_INPUT_SELECTOR, index)
}

/// Listing with LOT-3 full and LOT-7 free; the LOT-7 buy button opens the form.
fn lot7_listing() -> Arc<FakePage> {
    let page = FakePage::new(listing_html(&[("LOT-3", 0), ("LOT-7", 1)]));
    page.on_click(listing_buy_button(1), FORM_HTML);
    page
}

#[tokio::test(start_paused = true)]
async fn test_priority_target_is_submitted_automatically() {
    let page = lot7_listing();
    let recorder = Arc::new(RecordingNotifier::default());
    let alert_page = page.clone();
    let notifier = recorder.clone();
    let orchestrator = engine_with(page.clone(), ActivityLog::default(), move |ctx| {
        ctx.with_notifier(notifier)
            .with_notifier(Arc::new(PageAlertNotifier::new(alert_page)))
    });

    orchestrator.start(profile_config().with_priority(["LOT-7"]));
    sleep(Duration::from_secs(5)).await;

    let notices = recorder.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].name, "LOT-7");
    assert!(notices[0].is_priority);
    assert_eq!(page.messages().len(), 1);

    assert_eq!(page.clicks(), vec![listing_buy_button(1), form_submit()]);
    assert_eq!(page.value_of(&select(0)).as_deref(), Some("1"));
    assert_eq!(page.value_of(&select(1)).as_deref(), Some("7"));
    assert_eq!(page.value_of(&select(2)).as_deref(), Some("P"));
    assert_eq!(page.value_of(&select(3)).as_deref(), Some("3"));
    assert_eq!(page.value_of(&input(0)).as_deref(), Some("123ABC"));
    assert_eq!(page.value_of(&input(1)).as_deref(), Some("2019"));

    let status = orchestrator.status();
    assert_eq!(status.acquisition, AcquisitionState::AutoSubmitted);
    assert!(!status.form_lock_active);
    assert!(status.is_quiescent());
}

#[tokio::test(start_paused = true)]
async fn test_non_priority_target_is_left_for_review() {
    let page = lot7_listing();
    let activity = ActivityLog::default();
    let mut rx = activity.subscribe();
    let orchestrator = engine_with(page.clone(), activity, |ctx| ctx);

    orchestrator.start(profile_config());
    sleep(Duration::from_secs(5)).await;

    assert_eq!(page.clicks(), vec![listing_buy_button(1)]);
    assert_eq!(page.value_of(&input(0)).as_deref(), Some("123ABC"));

    let status = orchestrator.status();
    assert_eq!(status.acquisition, AcquisitionState::AwaitingManual);
    assert!(!status.form_lock_active);
    assert!(status.is_quiescent());

    let lines = drain(&mut rx);
    assert!(lines.iter().any(|l| l.message == "Space found: LOT-7 [MANUAL REVIEW]"));
    assert!(lines
        .iter()
        .any(|l| l.message.starts_with("Review the data and click")));
}

#[tokio::test(start_paused = true)]
async fn test_full_workflow_from_schedule_to_claim() {
    let page = FakePage::new(SCHEDULE_HTML);
    page.on_click(schedule_row(0), CATEGORY_HTML);
    page.on_click(
        ElementHandle::new(BUTTON_SELECTOR, 0),
        listing_html(&[("LOT-3", 0), ("LOT-7", 0)]),
    );
    page.on_reload(listing_html(&[("LOT-3", 0), ("LOT-7", 1)]));
    page.on_click(listing_buy_button(1), FORM_HTML);

    let orchestrator = engine(page.clone());
    forward_changes(&orchestrator, &page);
    orchestrator.start(profile_config());

    sleep(Duration::from_secs(5)).await;
    assert_eq!(
        page.clicks(),
        vec![schedule_row(0), ElementHandle::new(BUTTON_SELECTOR, 0)]
    );
    assert!(orchestrator.status().poll_timer_armed);
    assert_eq!(page.reloads(), 0);

    sleep(Duration::from_secs(25)).await;
    assert_eq!(page.reloads(), 1);
    assert_eq!(
        page.clicks(),
        vec![
            schedule_row(0),
            ElementHandle::new(BUTTON_SELECTOR, 0),
            listing_buy_button(1)
        ]
    );
    let status = orchestrator.status();
    assert_eq!(status.acquisition, AcquisitionState::AwaitingManual);
    assert!(status.is_quiescent());
}

#[tokio::test(start_paused = true)]
async fn test_first_available_row_in_render_order_wins() {
    let page = FakePage::new(listing_html(&[("A", 0), ("B", 2), ("C", 5)]));
    let recorder = Arc::new(RecordingNotifier::default());
    let notifier = recorder.clone();
    let orchestrator = engine_with(page.clone(), ActivityLog::default(), move |ctx| {
        ctx.with_notifier(notifier)
    });

    orchestrator.start(EngineConfig::default());
    sleep(Duration::from_secs(2)).await;

    let notices = recorder.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].name, "B");
    assert_eq!(notices[0].available_count, 2);
    assert_eq!(page.clicks(), vec![listing_buy_button(1)]);
}

#[tokio::test(start_paused = true)]
async fn test_target_filter_matches_substring() {
    let page = FakePage::new(listing_html(&[
        ("Parqueo Sur", 3),
        ("Parqueo Norte Centro", 1),
    ]));
    let recorder = Arc::new(RecordingNotifier::default());
    let notifier = recorder.clone();
    let orchestrator = engine_with(page.clone(), ActivityLog::default(), move |ctx| {
        ctx.with_notifier(notifier)
    });

    orchestrator.start(EngineConfig::default().with_targets(["NORTE"]));
    sleep(Duration::from_secs(2)).await;

    let notices = recorder.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].name, "Parqueo Norte Centro");
    assert!(!notices[0].is_priority);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_checks_scan_once() {
    let page = FakePage::new(listing_html(&[("LOT-3", 0)]));
    page.set_read_latency(Duration::from_millis(50));
    let orchestrator = engine(page.clone());
    orchestrator
        .context()
        .state()
        .begin_run(EngineConfig::default());
    let monitor = ResourceMonitor::new(orchestrator.context().clone());

    let (first, second) = tokio::join!(monitor.check_availability(), monitor.check_availability());

    let skipped = [&first, &second]
        .iter()
        .filter(|outcome| ***outcome == ScanOutcome::Skipped)
        .count();
    assert_eq!(skipped, 1);
    assert_eq!(page.list_calls(), 1);
    assert!(!orchestrator.status().monitor_in_flight);
}

#[tokio::test(start_paused = true)]
async fn test_stop_is_idempotent_and_halts_polling() {
    let page = FakePage::new(listing_html(&[("LOT-3", 0)]));
    let orchestrator = engine(page.clone());

    orchestrator.stop();
    orchestrator.stop();
    assert!(orchestrator.status().is_quiescent());

    orchestrator.start(profile_config());
    sleep(Duration::from_secs(15)).await;
    assert_eq!(page.reloads(), 1);

    orchestrator.stop();
    orchestrator.stop();
    assert!(orchestrator.status().is_quiescent());

    sleep(Duration::from_secs(60)).await;
    assert_eq!(page.reloads(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_watchdog_leaves_listing_alone() {
    let page = FakePage::new(listing_html(&[("LOT-3", 0)]));
    let orchestrator = engine(page.clone());

    orchestrator.start(EngineConfig {
        poll_interval: Duration::from_secs(3600),
        ..Default::default()
    });
    sleep(Duration::from_secs(300)).await;

    assert_eq!(page.reloads(), 0);
    assert!(orchestrator.status().watchdog_armed);
}

#[tokio::test(start_paused = true)]
async fn test_watchdog_respects_form_lock() {
    let page = FakePage::new(FORM_HTML);
    let orchestrator = engine(page.clone());

    orchestrator.start(EngineConfig::default());
    sleep(Duration::from_secs(1)).await;
    orchestrator.context().state().form_lock_active = true;
    sleep(Duration::from_secs(300)).await;

    assert_eq!(page.reloads(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_watchdog_recovers_stuck_page() {
    let page = FakePage::new(FORM_HTML);
    let activity = ActivityLog::default();
    let mut rx = activity.subscribe();
    let orchestrator = engine_with(page.clone(), activity, |ctx| ctx);

    orchestrator.start(EngineConfig::default());
    sleep(Duration::from_secs(61)).await;

    assert_eq!(page.reloads(), 1);
    let lines = drain(&mut rx);
    assert!(lines
        .iter()
        .any(|l| l.is_error() && l.message.starts_with("Stuck on page completion-form")));
    // The reload starts a fresh visit that is handled again.
    let status = orchestrator.status();
    assert!(status.running);
    assert!(status.page_handled_for_this_visit);
}

#[tokio::test(start_paused = true)]
async fn test_unchanged_page_is_not_driven_twice() {
    let page = FakePage::new(CATEGORY_HTML);
    let orchestrator = engine(page.clone());
    forward_changes(&orchestrator, &page);

    orchestrator.start(EngineConfig::default());
    sleep(Duration::from_secs(1)).await;
    assert_eq!(page.clicks().len(), 1);

    for _ in 0..3 {
        page.show(CATEGORY_HTML);
        sleep(Duration::from_secs(1)).await;
    }
    assert_eq!(page.clicks().len(), 1);

    page.show(SCHEDULE_HTML);
    sleep(Duration::from_secs(1)).await;
    assert_eq!(page.clicks(), vec![ElementHandle::new(BUTTON_SELECTOR, 0), schedule_row(0)]);
}

#[tokio::test(start_paused = true)]
async fn test_page_errors_are_logged_not_fatal() {
    let activity = ActivityLog::default();
    let mut rx = activity.subscribe();
    let orchestrator = engine_with(Arc::new(BrokenPage), activity, |ctx| ctx);

    orchestrator.start(EngineConfig::default());
    sleep(Duration::from_secs(1)).await;

    let lines = drain(&mut rx);
    assert!(lines
        .iter()
        .any(|l| l.message.starts_with("Page classification failed")));
    assert!(orchestrator.status().running);
}
