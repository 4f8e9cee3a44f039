use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub browser: BrowserConfig,
    pub engine: EngineTimings,
    pub database: DatabaseConfig,
    pub snapshots: SnapshotConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub start_url: String,
    pub chrome_path: Option<String>,
    pub headless: bool,
    pub user_data_dir: Option<String>,
    pub window_width: u32,
    pub window_height: u32,
    pub navigation_timeout_secs: u64,
    pub observer_interval_ms: u64,
    pub launch_retries: usize,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            start_url: "https://parqueos.example.com/".to_string(),
            chrome_path: None,
            headless: false,
            user_data_dir: None,
            window_width: 1280,
            window_height: 900,
            navigation_timeout_secs: 30,
            observer_interval_ms: 250,
            launch_retries: 3,
        }
    }
}

/// Delays, cadences and bounded-wait limits used by the engine components.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineTimings {
    pub start_settle_ms: u64,
    pub dispatch_settle_ms: u64,
    pub watchdog_interval_ms: u64,
    pub stuck_threshold_ms: u64,
    pub category_wait_ms: u64,
    pub listing_wait_ms: u64,
    pub schedule_verify_delay_ms: u64,
    /// `None` keeps retrying the schedule row until the page moves on.
    pub max_schedule_retries: Option<u32>,
    pub form_load_wait_ms: u64,
    pub color_wait_attempts: u32,
    pub color_wait_interval_ms: u64,
    pub other_color_attempts: u32,
    pub other_color_interval_ms: u64,
    pub submit_delay_ms: u64,
    pub acquisition_delay_ms: u64,
    pub readiness_poll_ms: u64,
}

impl Default for EngineTimings {
    fn default() -> Self {
        Self {
            start_settle_ms: 500,
            dispatch_settle_ms: 200,
            watchdog_interval_ms: 15_000,
            stuck_threshold_ms: 45_000,
            category_wait_ms: 3_000,
            listing_wait_ms: 3_000,
            schedule_verify_delay_ms: 3_000,
            max_schedule_retries: None,
            form_load_wait_ms: 5_000,
            color_wait_attempts: 15,
            color_wait_interval_ms: 100,
            other_color_attempts: 5,
            other_color_interval_ms: 100,
            submit_delay_ms: 500,
            acquisition_delay_ms: 100,
            readiness_poll_ms: 100,
        }
    }
}

impl EngineTimings {
    pub fn start_settle(&self) -> Duration {
        Duration::from_millis(self.start_settle_ms)
    }

    pub fn dispatch_settle(&self) -> Duration {
        Duration::from_millis(self.dispatch_settle_ms)
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_millis(self.watchdog_interval_ms)
    }

    pub fn stuck_threshold(&self) -> Duration {
        Duration::from_millis(self.stuck_threshold_ms)
    }

    pub fn readiness_poll(&self) -> Duration {
        Duration::from_millis(self.readiness_poll_ms)
    }

    pub fn category_wait(&self) -> Duration {
        Duration::from_millis(self.category_wait_ms)
    }

    pub fn listing_wait(&self) -> Duration {
        Duration::from_millis(self.listing_wait_ms)
    }

    pub fn schedule_verify_delay(&self) -> Duration {
        Duration::from_millis(self.schedule_verify_delay_ms)
    }

    pub fn form_load_wait(&self) -> Duration {
        Duration::from_millis(self.form_load_wait_ms)
    }

    pub fn color_wait_interval(&self) -> Duration {
        Duration::from_millis(self.color_wait_interval_ms)
    }

    pub fn other_color_interval(&self) -> Duration {
        Duration::from_millis(self.other_color_interval_ms)
    }

    pub fn submit_delay(&self) -> Duration {
        Duration::from_millis(self.submit_delay_ms)
    }

    pub fn acquisition_delay(&self) -> Duration {
        Duration::from_millis(self.acquisition_delay_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.watchdog_interval_ms == 0 {
            return Err(ConfigError::Message("Engine watchdog_interval_ms must be greater than 0".into()));
        }

        if self.stuck_threshold_ms <= self.watchdog_interval_ms {
            return Err(ConfigError::Message(
                "Engine stuck_threshold_ms must exceed watchdog_interval_ms".into(),
            ));
        }

        if self.readiness_poll_ms == 0 || self.color_wait_interval_ms == 0 || self.other_color_interval_ms == 0 {
            return Err(ConfigError::Message("Engine poll intervals must be greater than 0".into()));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/settings.db?mode=rwc".to_string(),
            max_connections: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub enabled: bool,
    pub directory: String,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: "data/snapshots".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9001,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub directory: Option<String>,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            file_prefix: "parking-sniper.log".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Built-in defaults keep every file optional
            .add_source(Config::try_from(&AppConfig::default())?)
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add local config (ignored by git)
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables with prefix "SNIPER_"
            .add_source(Environment::with_prefix("SNIPER").separator("__"))
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;

        if config.browser.chrome_path.is_none() {
            config.browser.chrome_path = env::var("CHROME_PATH").ok();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if Url::parse(&self.browser.start_url).is_err() {
            return Err(ConfigError::Message("Invalid browser start_url format".into()));
        }

        if self.browser.observer_interval_ms == 0 {
            return Err(ConfigError::Message("Browser observer_interval_ms must be greater than 0".into()));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Message("Database max_connections must be greater than 0".into()));
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(ConfigError::Message("Metrics port must be greater than 0".into()));
        }

        self.engine.validate()
    }
}
