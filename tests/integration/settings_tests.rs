use clap::Parser;
use std::time::Duration;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

use parking_sniper::activity::{ActivityLog, LogLevel, LogLine};
use parking_sniper::cli::{Cli, Command, edit_settings, render_status};
use parking_sniper::config::DatabaseConfig;
use parking_sniper::engine::AcquisitionState;
use parking_sniper::models::VehicleCategory;
use parking_sniper::settings::{MAX_LOG_ENTRIES, SettingsStore};

use super::*;

async fn temp_store() -> (SettingsStore, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = DatabaseConfig {
        url: format!("sqlite://{}", dir.path().join("settings.db").display()),
        max_connections: 1,
    };
    (SettingsStore::connect(&config).await.unwrap(), dir)
}

async fn run_cli(store: &SettingsStore, args: &[&str]) -> parking_sniper::Result<String> {
    let mut argv = vec!["parking-sniper"];
    argv.extend_from_slice(args);
    match Cli::try_parse_from(argv).unwrap().command {
        Command::Edit(edit) => edit_settings(store, edit).await,
        other => panic!("expected a settings edit, got {:?}", other),
    }
}

#[tokio::test]
async fn test_cli_edits_are_persisted_and_logged() {
    let (store, _dir) = temp_store().await;

    assert_eq!(
        run_cli(&store, &["add-parking", " lot-7 ", "--priority"]).await.unwrap(),
        "Parking added: LOT-7 (priority)"
    );
    assert_eq!(
        run_cli(&store, &["add-parking", "norte"]).await.unwrap(),
        "Parking added: NORTE"
    );
    assert_eq!(
        run_cli(&store, &["set-interval", "30"]).await.unwrap(),
        "Interval updated: 30s"
    );
    run_cli(&store, &["set-category", "motorcycle"]).await.unwrap();
    run_cli(
        &store,
        &["set-vehicle", "--plate", "m123abc", "--brand", "Honda", "--model", "2021", "--color", "Negro"],
    )
    .await
    .unwrap();

    let settings = store.load().await.unwrap();
    assert_eq!(settings.parkings, vec!["LOT-7", "NORTE"]);
    assert_eq!(settings.priority_parkings, vec!["LOT-7"]);
    assert_eq!(settings.refresh_interval, 30);
    assert_eq!(settings.vehicle_type, VehicleCategory::Motorcycle);
    assert_eq!(settings.vehicle_data.plate, "M123ABC");
    assert_eq!(settings.logs.len(), 5);
    assert_eq!(settings.logs[0].message, "Vehicle data updated");

    let status = render_status(&settings);
    assert!(status.contains("LOT-7 [priority]"));
    assert!(status.contains("Interval:      30s"));
}

#[tokio::test]
async fn test_rejected_edit_leaves_store_untouched() {
    let (store, _dir) = temp_store().await;
    run_cli(&store, &["add-parking", "LOT-7"]).await.unwrap();

    assert_err!(run_cli(&store, &["add-parking", "lot-7"]).await);
    assert_err!(run_cli(&store, &["set-interval", "0"]).await);
    assert_err!(run_cli(&store, &["set-alert-url", "not a url"]).await);
    assert_err!(run_cli(&store, &["remove-parking", "LOT-9"]).await);

    let settings = store.load().await.unwrap();
    assert_eq!(settings.parkings, vec!["LOT-7"]);
    assert_eq!(settings.refresh_interval, 10);
    assert!(settings.alert_url.is_none());
    assert_eq!(settings.logs.len(), 1);
}

#[tokio::test]
async fn test_alert_url_can_be_cleared() {
    let (store, _dir) = temp_store().await;

    assert_eq!(
        run_cli(&store, &["set-alert-url", "https://alerts.example.com/ping"])
            .await
            .unwrap(),
        "Alert URL configured"
    );
    assert_eq!(
        run_cli(&store, &["set-alert-url"]).await.unwrap(),
        "Alert URL removed"
    );
    assert!(store.load().await.unwrap().alert_url.is_none());
}

#[tokio::test]
async fn test_persisted_log_is_capped() {
    let (store, _dir) = temp_store().await;

    for i in 0..(MAX_LOG_ENTRIES + 5) {
        assert_ok!(
            store
                .append_log(LogLine::new(LogLevel::Info, format!("entry {}", i)))
                .await
        );
    }

    let logs = store.load().await.unwrap().logs;
    assert_eq!(logs.len(), MAX_LOG_ENTRIES);
    assert_eq!(logs[0].message, format!("entry {}", MAX_LOG_ENTRIES + 4));
}

#[tokio::test]
async fn test_persisted_settings_drive_a_run() {
    let (store, _dir) = temp_store().await;
    run_cli(&store, &["add-parking", "LOT-7", "--priority"]).await.unwrap();
    run_cli(
        &store,
        &["set-vehicle", "--plate", "p123abc", "--brand", "Toyota", "--model", "2019", "--color", "Rojo"],
    )
    .await
    .unwrap();
    assert_ok!(store.set_active(true).await);

    let settings = store.load().await.unwrap();
    assert!(settings.is_active);
    let config = settings.to_engine_config().unwrap();

    tokio::time::pause();
    let page = FakePage::new(listing_html(&[("LOT-3", 2), ("LOT-7", 1)]));
    page.on_click(listing_buy_button(1), FORM_HTML);
    let orchestrator = engine_with(page.clone(), ActivityLog::default(), |ctx| ctx);

    orchestrator.start(config);
    tokio::time::sleep(Duration::from_secs(5)).await;

    // LOT-3 has space but is not a monitored parking.
    assert_eq!(page.clicks(), vec![listing_buy_button(1), form_submit()]);
    assert_eq!(
        orchestrator.status().acquisition,
        AcquisitionState::AutoSubmitted
    );
}
