use anyhow::Result;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use parking_sniper::AppConfig;
use parking_sniper::cli::{Cli, Command, edit_settings, render_status, run_host};
use parking_sniper::settings::SettingsStore;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = AppConfig::from_env()?;

    // Optional daily log file next to the console output
    let (file_layer, _guard) = match &config.logging.directory {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, &config.logging.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("parking_sniper=debug".parse()?))
        .with(fmt::layer())
        .with(file_layer)
        .init();

    if let Some(parent) = config
        .database
        .url
        .strip_prefix("sqlite://")
        .and_then(|path| std::path::Path::new(path.split('?').next().unwrap_or(path)).parent())
    {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let store = SettingsStore::connect(&config.database).await?;

    match cli.command {
        Command::Run => {
            if config.metrics.enabled {
                PrometheusBuilder::new()
                    .with_http_listener(([0, 0, 0, 0], config.metrics.port))
                    .install()?;
                info!("Metrics exporter listening on port {}", config.metrics.port);
            }
            info!("Starting parking sniper...");
            run_host(config, store).await?;
        }
        Command::Status => {
            print!("{}", render_status(&store.load().await?));
        }
        Command::Logs { limit } => {
            for line in store.load().await?.logs.iter().take(limit) {
                println!("{}", line.display_text());
            }
        }
        Command::Edit(edit) => {
            println!("{}", edit_settings(&store, edit).await?);
        }
    }

    Ok(())
}
