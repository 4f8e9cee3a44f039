use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use super::normalize_name;

/// One monitorable resource and its current available count. Recomputed on
/// every scan, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListingEntry {
    pub name: String,
    pub available_count: u32,
}

impl ListingEntry {
    /// Builds an entry from the raw row texts. Rows without a name or without
    /// a numeric "Disponibles: N" badge are not entries.
    pub fn from_raw(name: Option<&str>, available_text: Option<&str>) -> Option<Self> {
        let name = normalize_name(name?);
        if name.is_empty() {
            return None;
        }
        let available_count = parse_available_count(available_text?)?;
        Some(Self {
            name,
            available_count,
        })
    }
}

pub fn parse_available_count(text: &str) -> Option<u32> {
    static AVAILABLE: OnceLock<Regex> = OnceLock::new();
    let regex = AVAILABLE.get_or_init(|| {
        Regex::new(r"(?i)Disponibles:\s*(\d+)").expect("static regex is valid")
    });
    let digits = regex.captures(text)?.get(1)?.as_str();
    // Only overflow can fail here; a huge badge still means space.
    Some(digits.parse().unwrap_or(u32::MAX))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityEvent {
    pub entry: ListingEntry,
    pub is_priority: bool,
}
