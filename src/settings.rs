//! Persisted settings record: the targets, vehicle data and preferences the
//! engine reads at start, plus the capped activity log.
//!
//! Stored in SQLite as one JSON value per key.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;
use validator::Validate;

use crate::activity::LogLine;
use crate::config::DatabaseConfig;
use crate::models::{EngineConfig, SystemSetting, VehicleCategory, VehicleProfile, normalize_name};
use crate::utils::error::{AppError, Result};

pub const MAX_LOG_ENTRIES: usize = 50;

pub const KEY_IS_ACTIVE: &str = "isActive";
pub const KEY_VEHICLE_TYPE: &str = "vehicleType";
pub const KEY_PARKINGS: &str = "parkings";
pub const KEY_PRIORITY_PARKINGS: &str = "priorityParkings";
pub const KEY_REFRESH_INTERVAL: &str = "refreshInterval";
pub const KEY_ALERT_URL: &str = "alertUrl";
pub const KEY_VEHICLE_DATA: &str = "vehicleData";
pub const KEY_LOGS: &str = "logs";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EngineSettings {
    pub is_active: bool,
    pub vehicle_type: VehicleCategory,
    pub parkings: Vec<String>,
    pub priority_parkings: Vec<String>,
    /// Seconds between polls.
    #[validate(range(min = 1, message = "refresh interval must be at least 1 second"))]
    pub refresh_interval: u64,
    #[validate(url(message = "alert URL must be a valid URL"))]
    pub alert_url: Option<String>,
    pub vehicle_data: VehicleProfile,
    /// Newest first.
    pub logs: Vec<LogLine>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            is_active: false,
            vehicle_type: VehicleCategory::Car,
            parkings: Vec::new(),
            priority_parkings: Vec::new(),
            refresh_interval: 10,
            alert_url: None,
            vehicle_data: VehicleProfile::default(),
            logs: Vec::new(),
        }
    }
}

fn clean_name(name: &str) -> Result<String> {
    let name = normalize_name(name).to_uppercase();
    if name.is_empty() {
        return Err(AppError::Validation("parking name must not be empty".to_string()));
    }
    Ok(name)
}

impl EngineSettings {
    /// Adds a monitored parking. Names are stored trimmed and upper-cased.
    pub fn add_target(&mut self, name: &str, priority: bool) -> Result<String> {
        let name = clean_name(name)?;
        if self.parkings.contains(&name) {
            return Err(AppError::Validation(format!("{} is already in the list", name)));
        }
        self.parkings.push(name.clone());
        if priority && !self.priority_parkings.contains(&name) {
            self.priority_parkings.push(name.clone());
        }
        Ok(name)
    }

    /// Removes a parking from both lists.
    pub fn remove_target(&mut self, name: &str) -> Result<String> {
        let name = clean_name(name)?;
        let before = self.parkings.len();
        self.parkings.retain(|p| *p != name);
        if self.parkings.len() == before {
            return Err(AppError::not_found(format!("parking {}", name)));
        }
        self.priority_parkings.retain(|p| *p != name);
        Ok(name)
    }

    pub fn add_priority(&mut self, name: &str) -> Result<String> {
        let name = clean_name(name)?;
        if self.priority_parkings.contains(&name) {
            return Err(AppError::Validation(format!("{} is already a priority", name)));
        }
        self.priority_parkings.push(name.clone());
        Ok(name)
    }

    pub fn remove_priority(&mut self, name: &str) -> Result<String> {
        let name = clean_name(name)?;
        let before = self.priority_parkings.len();
        self.priority_parkings.retain(|p| *p != name);
        if self.priority_parkings.len() == before {
            return Err(AppError::not_found(format!("priority parking {}", name)));
        }
        Ok(name)
    }

    pub fn set_refresh_interval(&mut self, seconds: u64) -> Result<()> {
        self.refresh_interval = seconds;
        self.validate()?;
        Ok(())
    }

    /// An empty value clears the alert URL.
    pub fn set_alert_url(&mut self, url: Option<&str>) -> Result<()> {
        self.alert_url = match url.map(str::trim) {
            Some(url) if !url.is_empty() => Some(Url::parse(url)?.to_string()),
            _ => None,
        };
        Ok(())
    }

    pub fn set_vehicle(&mut self, plate: &str, brand: &str, model: &str, color: &str) {
        self.vehicle_data = VehicleProfile {
            plate: plate.trim().to_uppercase(),
            brand: brand.trim().to_string(),
            model: model.trim().to_string(),
            color: color.trim().to_string(),
        };
    }

    /// Prepends a log line, dropping the oldest past the cap.
    pub fn push_log(&mut self, line: LogLine) {
        self.logs.insert(0, line);
        self.logs.truncate(MAX_LOG_ENTRIES);
    }

    /// The run configuration captured on start.
    pub fn to_engine_config(&self) -> Result<EngineConfig> {
        self.validate()?;
        let notify_url = self.alert_url.as_deref().map(Url::parse).transpose()?;

        Ok(EngineConfig {
            active: self.is_active,
            vehicle_category: self.vehicle_type,
            poll_interval: Duration::from_secs(self.refresh_interval),
            notify_url,
            vehicle_profile: self.vehicle_data.clone(),
            ..Default::default()
        }
        .with_targets(&self.parkings)
        .with_priority(&self.priority_parkings))
    }

    fn to_rows(&self) -> Result<Vec<SystemSetting>> {
        Ok(vec![
            SystemSetting::encode(KEY_IS_ACTIVE, &self.is_active)?,
            SystemSetting::encode(KEY_VEHICLE_TYPE, &self.vehicle_type)?,
            SystemSetting::encode(KEY_PARKINGS, &self.parkings)?,
            SystemSetting::encode(KEY_PRIORITY_PARKINGS, &self.priority_parkings)?,
            SystemSetting::encode(KEY_REFRESH_INTERVAL, &self.refresh_interval)?,
            SystemSetting::encode(KEY_ALERT_URL, &self.alert_url)?,
            SystemSetting::encode(KEY_VEHICLE_DATA, &self.vehicle_data)?,
            SystemSetting::encode(KEY_LOGS, &self.logs)?,
        ])
    }

    /// Missing keys keep their defaults.
    fn from_rows(rows: &[SystemSetting]) -> Result<Self> {
        let mut settings = Self::default();
        for row in rows {
            match row.key.as_str() {
                KEY_IS_ACTIVE => settings.is_active = row.decode()?,
                KEY_VEHICLE_TYPE => settings.vehicle_type = row.decode()?,
                KEY_PARKINGS => settings.parkings = row.decode()?,
                KEY_PRIORITY_PARKINGS => settings.priority_parkings = row.decode()?,
                KEY_REFRESH_INTERVAL => settings.refresh_interval = row.decode()?,
                KEY_ALERT_URL => settings.alert_url = row.decode()?,
                KEY_VEHICLE_DATA => settings.vehicle_data = row.decode()?,
                KEY_LOGS => settings.logs = row.decode()?,
                other => debug!("Ignoring unknown setting {}", other),
            }
        }
        Ok(settings)
    }
}

#[derive(Clone)]
pub struct SettingsStore {
    pool: SqlitePool,
    // Serializes read-modify-write cycles across clones.
    edits: Arc<Mutex<()>>,
}

impl SettingsStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(sqlx::Error::from)?;
        Ok(Self {
            pool,
            edits: Arc::new(Mutex::new(())),
        })
    }

    pub async fn load(&self) -> Result<EngineSettings> {
        let rows = sqlx::query_as::<_, SystemSetting>("SELECT key, value_json FROM settings")
            .fetch_all(&self.pool)
            .await?;
        EngineSettings::from_rows(&rows)
    }

    pub async fn save(&self, settings: &EngineSettings) -> Result<()> {
        settings.validate()?;
        let mut tx = self.pool.begin().await?;
        for row in settings.to_rows()? {
            sqlx::query(
                r#"
                INSERT INTO settings (key, value_json, updated_at)
                VALUES (?, ?, datetime('now'))
                ON CONFLICT(key) DO UPDATE SET
                    value_json = excluded.value_json,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&row.key)
            .bind(&row.value_json)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Loads, edits and saves the record. Nothing is written when `edit`
    /// fails.
    pub async fn update<T, F>(&self, edit: F) -> Result<T>
    where
        F: FnOnce(&mut EngineSettings) -> Result<T>,
    {
        let _guard = self.edits.lock().await;
        let mut settings = self.load().await?;
        let out = edit(&mut settings)?;
        self.save(&settings).await?;
        Ok(out)
    }

    pub async fn append_log(&self, line: LogLine) -> Result<()> {
        self.update(|settings| {
            settings.push_log(line);
            Ok(())
        })
        .await
    }

    pub async fn set_active(&self, active: bool) -> Result<()> {
        self.update(|settings| {
            settings.is_active = active;
            Ok(())
        })
        .await
    }
}
