pub mod activity;
pub mod cli;
pub mod config;
pub mod engine;
pub mod models;
pub mod notify;
pub mod page;
pub mod settings;
pub mod utils;

// Re-export commonly used types
pub use config::AppConfig;
pub use engine::{EngineContext, Orchestrator};
pub use utils::error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;
