//! The engine's human-readable activity stream.
//!
//! Every status line is mirrored to `tracing` and broadcast to subscribers;
//! the binary persists what it receives into the settings record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{error, info};

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub at: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

impl LogLine {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            at: Utc::now(),
            level,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == LogLevel::Error
    }

    /// `[HH:MM:SS] message`, with error lines prefixed.
    pub fn display_text(&self) -> String {
        let time = self.at.format("%H:%M:%S");
        match self.level {
            LogLevel::Info => format!("[{}] {}", time, self.message),
            LogLevel::Error => format!("[{}] Error: {}", time, self.message),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ActivityLog {
    sender: broadcast::Sender<LogLine>,
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ActivityLog {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogLine> {
        self.sender.subscribe()
    }

    pub fn info(&self, message: impl Into<String>) {
        let line = LogLine::new(LogLevel::Info, message);
        info!(target: "parking_sniper::activity", "{}", line.message);
        self.publish(line);
    }

    pub fn error(&self, message: impl Into<String>) {
        let line = LogLine::new(LogLevel::Error, message);
        error!(target: "parking_sniper::activity", "{}", line.message);
        self.publish(line);
    }

    pub fn availability(&self, name: &str, available: u32) {
        self.info(format!("{}: {} available", name, available));
    }

    fn publish(&self, line: LogLine) {
        // No subscribers is fine; the line already went to tracing.
        let _ = self.sender.send(line);
    }
}
