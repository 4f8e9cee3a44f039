use serde::{Deserialize, Serialize, de::DeserializeOwned};
use sqlx::FromRow;

use crate::utils::error::Result;

/// One key of the persisted settings record, stored as a JSON value.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct SystemSetting {
    pub key: String,
    pub value_json: String,
}

impl SystemSetting {
    pub fn encode<T: Serialize>(key: &str, value: &T) -> Result<Self> {
        Ok(Self {
            key: key.to_string(),
            value_json: serde_json::to_string(value)?,
        })
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.value_json)?)
    }
}
