use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub mod engine_config;
pub mod listing;
pub mod system_setting;

// Re-exports for convenience
pub use engine_config::*;
pub use listing::*;
pub use system_setting::*;

/// Step of the reservation workflow the browser is currently showing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PageKind {
    Unknown,
    CategorySelect,
    Schedule,
    Listing,
    CompletionForm,
}

impl PageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageKind::Unknown => "unknown",
            PageKind::CategorySelect => "category-select",
            PageKind::Schedule => "schedule",
            PageKind::Listing => "listing",
            PageKind::CompletionForm => "completion-form",
        }
    }
}

impl fmt::Display for PageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum VehicleCategory {
    #[default]
    Car,
    Motorcycle,
}

impl VehicleCategory {
    /// Label the portal renders on the category button.
    pub fn label(&self) -> &'static str {
        match self {
            VehicleCategory::Car => "Automóvil",
            VehicleCategory::Motorcycle => "Motocicleta",
        }
    }

    /// Icon class that marks the category button.
    pub fn icon_class(&self) -> &'static str {
        match self {
            VehicleCategory::Car => "fa-car",
            VehicleCategory::Motorcycle => "fa-motorcycle",
        }
    }
}

impl std::str::FromStr for VehicleCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "car" | "a" => Ok(VehicleCategory::Car),
            "motorcycle" | "moto" | "b" => Ok(VehicleCategory::Motorcycle),
            other => Err(format!("unknown vehicle category: {}", other)),
        }
    }
}

/// Collapses inner whitespace and trims, so names copied from the page and
/// names typed by the user compare equal.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}
