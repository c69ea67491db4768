//! Persisted per-project records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata for one contract version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    /// Version ID
    pub version_id: String,
    /// Where the text came from ("upload", ...)
    pub source: String,
    /// SHA-256 of the contract text, lowercase hex
    pub checksum: String,
    /// Ingestion time
    pub created_at: DateTime<Utc>,
    /// Free-form notes
    #[serde(default)]
    pub notes: Option<String>,
    /// Diff against the previous version; `None` for the first version
    #[serde(default)]
    pub diff_summary: Option<String>,
    /// Opaque snapshot of the clause graph
    #[serde(default)]
    pub graph_snapshot: Option<String>,
}

/// A user preference; the latest write for a key wins
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceRecord {
    /// Preference key
    pub key: String,
    /// Arbitrary JSON value
    pub value: serde_json::Value,
    /// Why the user set it
    #[serde(default)]
    pub rationale: Option<String>,
    /// Last write time
    pub updated_at: DateTime<Utc>,
    /// "user", "session", ...
    pub source: String,
}

/// Audit trail entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentEvent {
    /// When it happened
    pub timestamp: DateTime<Utc>,
    /// Worker or component name
    pub agent: String,
    /// "ingest_version", "completed", "error", "no_worker"
    pub action: String,
    /// Version the event concerns
    pub version_id: String,
    /// Action-specific data
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Everything persisted for one project
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectRecord {
    /// Project ID
    pub project_id: String,
    /// Version history, oldest first
    pub versions: Vec<VersionRecord>,
    /// user -> key -> preference
    pub preferences: BTreeMap<String, BTreeMap<String, PreferenceRecord>>,
    /// Audit events, oldest first
    pub agent_events: Vec<AgentEvent>,
    /// Text of the most recent version that supplied one
    pub latest_contract_text: Option<String>,
}

impl ProjectRecord {
    /// Empty record for a project
    #[must_use]
    pub fn empty(project_id: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            ..Self::default()
        }
    }
}
