use crate::errors::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn default_true() -> bool {
    true
}

/// Engine knobs. Every field has a default, so `{}` is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Delete persisted entries that no live allocation backs.
    #[serde(default = "default_true")]
    pub prune_stale_entries: bool,
    /// Write claim records (with status) back to storage on success.
    #[serde(default = "default_true")]
    pub persist_claims: bool,
    /// Labels stamped on every seeded aggregate. Per-prefix labels win.
    #[serde(default)]
    pub seed_labels: BTreeMap<String, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            prune_stale_entries: true,
            persist_claims: true,
            seed_labels: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    /// Parse a JSON config; blank input yields the defaults.
    pub fn from_json(s: &str) -> Result<Self> {
        if s.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(s)?)
    }
}
