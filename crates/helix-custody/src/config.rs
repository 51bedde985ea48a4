//! Configuration for the custody orchestrator.

use helix_custody_core::{CoreError, SchemaVersion, DEFAULT_THRESHOLD};
use serde::Deserialize;

use crate::error::Result;

/// Configuration for [`Custody`](crate::Custody).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CustodyConfig {
    /// Re-verify the stored ledger tail before appending to it.
    pub verify_before_append: bool,
    /// Threshold of petitions opened through the orchestrator.
    pub default_quorum_threshold: usize,
    /// Schema version stamped on new identities and entries.
    pub schema_version: SchemaVersion,
    /// Resources listed in a new agent's INSTANTIATION entry.
    pub initial_resources: Vec<String>,
    /// Capabilities listed in a new agent's CAPABILITY_INIT entry.
    pub initial_capabilities: Vec<String>,
    /// Restrictions listed in a new agent's CAPABILITY_INIT entry.
    pub initial_restrictions: Vec<String>,
}

impl Default for CustodyConfig {
    fn default() -> Self {
        Self {
            verify_before_append: true,
            default_quorum_threshold: DEFAULT_THRESHOLD,
            schema_version: SchemaVersion::CURRENT,
            initial_resources: strings(&["compute", "memory", "network"]),
            initial_capabilities: strings(&["reasoning", "tool_use", "communication"]),
            initial_restrictions: strings(&["no_physical_actions", "no_financial_transfers"]),
        }
    }
}

impl CustodyConfig {
    /// Parse a JSON config; missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text).map_err(CoreError::from)?)
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
