//! Wiki configuration.
//!
//! Everything render behavior depends on — loremaster ids, namespaces, the
//! selected game system, recursion and fetch bounds — travels in one explicit
//! object handed to the orchestrator at construction time, so renders are
//! reproducible in tests without process-wide setup.

use crate::page::StoreError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WikiConfig {
    /// Identity strings granted the omniscient loremaster view.
    pub loremaster_ids: Vec<String>,

    /// Namespace prefix template references resolve under.
    pub template_namespace: String,

    /// Rule system used for on-demand secret reveals (see `pov`).
    pub rule_system: String,

    /// Bound on recursive template expansion; exceeding it truncates the
    /// branch to empty output.
    pub max_template_depth: usize,

    /// Timeout for remote SVG fetches, in seconds.
    pub fetch_timeout_secs: u64,
}

impl Default for WikiConfig {
    fn default() -> WikiConfig {
        WikiConfig {
            loremaster_ids: Vec::new(),
            template_namespace: "Template".to_string(),
            rule_system: "threshold".to_string(),
            max_template_depth: 32,
            fetch_timeout_secs: 5,
        }
    }
}

impl WikiConfig {
    /// Load from a YAML file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<WikiConfig, StoreError> {
        if !path.exists() {
            return Ok(WikiConfig::default());
        }
        let text = fs::read_to_string(path)?;
        serde_yaml::from_str(&text).map_err(|source| StoreError::Metadata {
            path: path.display().to_string(),
            source,
        })
    }
}
