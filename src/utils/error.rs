use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An expected control or field is absent from the page.
    #[error("Not found: {what}")]
    NotFound { what: String },

    /// A bounded wait elapsed before its condition held.
    #[error("Timed out after {waited_ms}ms waiting for {what}")]
    Timeout { what: String, waited_ms: u64 },

    /// The page adapter raised, usually because the page is mid-navigation.
    #[error("Page error: {0}")]
    TransientPage(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// The completion form could not be driven at all.
    #[error("Acquisition failed: {0}")]
    Acquisition(String),
}

impl AppError {
    pub fn not_found(what: impl Into<String>) -> Self {
        AppError::NotFound { what: what.into() }
    }

    pub fn timeout(what: impl Into<String>, waited_ms: u64) -> Self {
        AppError::Timeout {
            what: what.into(),
            waited_ms,
        }
    }

    /// Critical failures get an error-styled activity entry on top of the
    /// regular log line.
    pub fn is_critical(&self) -> bool {
        matches!(self, AppError::Acquisition(_))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(format!("{}", err))
    }
}

impl From<url::ParseError> for AppError {
    fn from(err: url::ParseError) -> Self {
        AppError::Validation(format!("invalid URL: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
