//! Engine configuration.
//!
//! Loaded from TOML, typically checked in next to the deployment:
//!
//! ```toml
//! max_concurrent_fetches = 8
//! max_requests_per_task = 64
//!
//! [sources.carrier_eglv]
//! enabled = false
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Tunables for one batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How many fetches may be in flight at once.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_fetches: usize,

    /// Hard ceiling on fetches one task may issue. A rule chain that runs
    /// past this is looping; the task fails fatally instead of crawling
    /// forever.
    #[serde(default = "default_request_budget")]
    pub max_requests_per_task: usize,

    /// Per-source switches, keyed by rule id.
    #[serde(default)]
    pub sources: HashMap<String, SourceConfig>,
}

/// Per-source switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Whether requests to this source may be issued at all.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_max_concurrent() -> usize {
    8
}

fn default_request_budget() -> usize {
    64
}

fn default_enabled() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: default_max_concurrent(),
            max_requests_per_task: default_request_budget(),
            sources: HashMap::new(),
        }
    }
}

impl EngineConfig {
    /// Parse from a TOML string.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::validation(format!("bad engine config: {e}")))
    }

    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::validation(format!("cannot read engine config: {e}")))?;
        Self::from_toml_str(&raw)
    }

    /// Whether a source may be fetched. Unlisted sources are enabled.
    pub fn is_source_enabled(&self, rule_id: &str) -> bool {
        self.sources.get(rule_id).map(|s| s.enabled).unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_missing_fields() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config.max_concurrent_fetches, 8);
        assert_eq!(config.max_requests_per_task, 64);
        assert!(config.is_source_enabled("anything"));
    }

    #[test]
    fn sources_can_be_disabled() {
        let config = EngineConfig::from_toml_str(
            r#"
            max_concurrent_fetches = 2

            [sources.carrier_eglv]
            enabled = false

            [sources.carrier_oolu]
            enabled = true
            "#,
        )
        .unwrap();

        assert_eq!(config.max_concurrent_fetches, 2);
        assert!(!config.is_source_enabled("carrier_eglv"));
        assert!(config.is_source_enabled("carrier_oolu"));
        assert!(config.is_source_enabled("unlisted"));
    }

    #[test]
    fn malformed_toml_is_a_validation_error() {
        assert!(matches!(
            EngineConfig::from_toml_str("max_concurrent_fetches = \"eight\""),
            Err(Error::Validation(_))
        ));
    }
}
