use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

use super::{VehicleCategory, normalize_name};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VehicleProfile {
    pub plate: String,
    pub brand: String,
    pub model: String,
    pub color: String,
}

/// Run configuration captured on `start`. Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub active: bool,
    pub vehicle_category: VehicleCategory,
    /// Ordered, duplicate-free. Empty means every row is a candidate.
    pub target_names: Vec<String>,
    pub priority_names: HashSet<String>,
    pub poll_interval: Duration,
    pub notify_url: Option<Url>,
    pub vehicle_profile: VehicleProfile,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            active: true,
            vehicle_category: VehicleCategory::Car,
            target_names: Vec::new(),
            priority_names: HashSet::new(),
            poll_interval: Duration::from_secs(10),
            notify_url: None,
            vehicle_profile: VehicleProfile::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.target_names.clear();
        for target in targets {
            let name = normalize_name(target.as_ref());
            if !name.is_empty() && !self.target_names.contains(&name) {
                self.target_names.push(name);
            }
        }
        self
    }

    pub fn with_priority<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.priority_names = names
            .into_iter()
            .map(|n| normalize_name(n.as_ref()))
            .filter(|n| !n.is_empty())
            .collect();
        self
    }

    /// Case-insensitive substring match against any target; pass-all when no
    /// targets are configured.
    pub fn matches_target(&self, row_name: &str) -> bool {
        if self.target_names.is_empty() {
            return true;
        }
        let haystack = normalize_name(row_name).to_lowercase();
        self.target_names
            .iter()
            .any(|target| haystack.contains(&target.to_lowercase()))
    }

    /// Exact membership after whitespace normalisation. Case is significant.
    pub fn is_priority(&self, name: &str) -> bool {
        self.priority_names.contains(&normalize_name(name))
    }
}
