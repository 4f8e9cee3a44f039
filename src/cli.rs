//! Command line surface: the runtime host plus the settings edits.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::activity::{ActivityLog, LogLevel, LogLine};
use crate::config::AppConfig;
use crate::engine::{EngineContext, Orchestrator};
use crate::models::VehicleCategory;
use crate::notify::{PageAlertNotifier, WebhookNotifier};
use crate::page::chrome::ChromePageAdapter;
use crate::page::observer::{ChromeChangeObserver, page_changes};
use crate::settings::{EngineSettings, SettingsStore};
use crate::utils::error::{AppError, Result};

#[derive(Debug, Parser)]
#[command(name = "parking-sniper", version, about = "Watches the parking portal and claims a space")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Launch the browser and run the engine. Reads start/stop/quit from stdin.
    Run,
    /// Print the persisted settings.
    Status,
    /// Print the activity log, newest first.
    Logs {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    #[command(flatten)]
    Edit(SettingsCommand),
}

#[derive(Debug, Subcommand)]
pub enum SettingsCommand {
    /// Add a parking to monitor.
    AddParking {
        name: String,
        /// Submit the form automatically when this parking frees up.
        #[arg(long)]
        priority: bool,
    },
    RemoveParking {
        name: String,
    },
    AddPriority {
        name: String,
    },
    RemovePriority {
        name: String,
    },
    /// Seconds between polls.
    SetInterval {
        seconds: u64,
    },
    /// Omit the URL to clear it.
    SetAlertUrl {
        url: Option<String>,
    },
    SetCategory {
        #[arg(value_parser = VehicleCategory::from_str)]
        category: VehicleCategory,
    },
    SetVehicle(VehicleArgs),
}

#[derive(Debug, Args)]
pub struct VehicleArgs {
    #[arg(long)]
    pub plate: String,
    #[arg(long, default_value = "")]
    pub brand: String,
    #[arg(long, default_value = "")]
    pub model: String,
    #[arg(long, default_value = "")]
    pub color: String,
}

impl SettingsCommand {
    /// Applies the edit and returns the line recorded in the activity log.
    pub fn apply(self, settings: &mut EngineSettings) -> Result<String> {
        match self {
            SettingsCommand::AddParking { name, priority } => {
                let name = settings.add_target(&name, priority)?;
                Ok(if priority {
                    format!("Parking added: {} (priority)", name)
                } else {
                    format!("Parking added: {}", name)
                })
            }
            SettingsCommand::RemoveParking { name } => {
                let name = settings.remove_target(&name)?;
                Ok(format!("Parking removed: {}", name))
            }
            SettingsCommand::AddPriority { name } => {
                let name = settings.add_priority(&name)?;
                Ok(format!("Priority parking added: {}", name))
            }
            SettingsCommand::RemovePriority { name } => {
                let name = settings.remove_priority(&name)?;
                Ok(format!("Priority parking removed: {}", name))
            }
            SettingsCommand::SetInterval { seconds } => {
                settings.set_refresh_interval(seconds)?;
                Ok(format!("Interval updated: {}s", seconds))
            }
            SettingsCommand::SetAlertUrl { url } => {
                settings.set_alert_url(url.as_deref())?;
                Ok(if settings.alert_url.is_some() {
                    "Alert URL configured".to_string()
                } else {
                    "Alert URL removed".to_string()
                })
            }
            SettingsCommand::SetCategory { category } => {
                settings.vehicle_type = category;
                Ok(format!("Vehicle type: {}", category.label()))
            }
            SettingsCommand::SetVehicle(args) => {
                settings.set_vehicle(&args.plate, &args.brand, &args.model, &args.color);
                Ok("Vehicle data updated".to_string())
            }
        }
    }
}

/// Applies a settings edit and records it in the log.
pub async fn edit_settings(store: &SettingsStore, command: SettingsCommand) -> Result<String> {
    store
        .update(|settings| {
            let message = command.apply(settings)?;
            settings.push_log(LogLine::new(LogLevel::Info, message.clone()));
            Ok(message)
        })
        .await
}

pub fn render_status(settings: &EngineSettings) -> String {
    let mut out = String::new();
    let status = if settings.is_active { "active" } else { "inactive" };
    out.push_str(&format!("Status:        {}\n", status));
    out.push_str(&format!("Vehicle type:  {}\n", settings.vehicle_type.label()));
    out.push_str(&format!("Interval:      {}s\n", settings.refresh_interval));
    out.push_str(&format!(
        "Alert URL:     {}\n",
        settings.alert_url.as_deref().unwrap_or("-")
    ));
    let vehicle = &settings.vehicle_data;
    out.push_str(&format!(
        "Vehicle:       {} {} {} {}\n",
        vehicle.plate, vehicle.brand, vehicle.model, vehicle.color
    ));
    if settings.parkings.is_empty() {
        out.push_str("Parkings:      none configured, every parking is monitored\n");
    } else {
        out.push_str("Parkings:\n");
        for name in &settings.parkings {
            let marker = if settings.priority_parkings.contains(name) {
                " [priority]"
            } else {
                ""
            };
            out.push_str(&format!("  - {}{}\n", name, marker));
        }
    }
    out
}

/// A line typed on the command channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCommand {
    Start,
    Stop,
    Quit,
}

impl FromStr for HostCommand {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(HostCommand::Start),
            "stop" => Ok(HostCommand::Stop),
            "quit" | "exit" => Ok(HostCommand::Quit),
            other => Err(AppError::Validation(format!(
                "unknown command '{}', expected start, stop or quit",
                other
            ))),
        }
    }
}

/// Reads the persisted settings and starts a run. Marks the record active.
async fn start_engine(orchestrator: &Orchestrator, store: &SettingsStore) -> Result<()> {
    let settings = store.load().await?;
    let config = settings.to_engine_config()?;
    store.set_active(true).await?;
    orchestrator.start(config);
    Ok(())
}

/// Launches the browser and runs the engine until `quit` or Ctrl-C.
pub async fn run_host(app: AppConfig, store: SettingsStore) -> anyhow::Result<()> {
    let page = Arc::new(
        ChromePageAdapter::launch(&app.browser)
            .await
            .context("failed to launch the browser")?,
    );

    let activity = ActivityLog::default();
    let ctx = EngineContext::new(page.clone(), activity.clone(), app.engine.clone())
        .with_snapshots(app.snapshots.clone())
        .with_notifier(Arc::new(WebhookNotifier::new()))
        .with_notifier(Arc::new(PageAlertNotifier::new(page.clone())))
        .into_shared();
    let orchestrator = Orchestrator::new(ctx);

    let mut lines = activity.subscribe();
    let log_store = store.clone();
    tokio::spawn(async move {
        loop {
            match lines.recv().await {
                Ok(line) => {
                    if let Err(e) = log_store.append_log(line).await {
                        warn!("Failed to persist activity line: {}", e);
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!("Activity persistence skipped {} lines", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let observer = Arc::new(ChromeChangeObserver::new(
        page.tab(),
        Duration::from_millis(app.browser.observer_interval_ms),
    ));
    let forwarder = orchestrator.clone();
    tokio::spawn(async move { forwarder.run_observer(page_changes(observer)).await });

    if store.load().await?.is_active {
        start_engine(&orchestrator, &store).await?;
    }

    info!("Ready. Type start, stop or quit");
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = stdin.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<HostCommand>() {
                    Ok(HostCommand::Start) => {
                        if let Err(e) = start_engine(&orchestrator, &store).await {
                            warn!("Start failed: {}", e);
                        }
                    }
                    Ok(HostCommand::Stop) => {
                        orchestrator.stop();
                        store.set_active(false).await?;
                    }
                    Ok(HostCommand::Quit) => break,
                    Err(e) => warn!("{}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    orchestrator.stop();
    info!("Shutting down...");
    Ok(())
}
