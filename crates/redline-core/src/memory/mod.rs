//! Project memory
//!
//! Durable, append-only history per project (versions, preferences, agent
//! events) on top of a [`ProjectStore`], plus the non-persistent
//! [`ContextStore`] of live analysis contexts.

mod record;
mod store;

pub use record::{AgentEvent, PreferenceRecord, ProjectRecord, VersionRecord};
pub use store::{InMemoryStore, JsonFileStore, ProjectStore, RecordUpdate};

use crate::context::{AnalysisContext, ContextStore};
use crate::error::MemoryError;
use chrono::Utc;
use redline_kernel::ContextId;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Facade over a project store and the live context store
#[derive(Debug, Clone)]
pub struct ProjectMemory {
    store: Arc<dyn ProjectStore>,
    contexts: Arc<ContextStore>,
}

impl ProjectMemory {
    /// Memory backed by `store`
    #[must_use]
    pub fn new(store: Arc<dyn ProjectStore>) -> Self {
        Self {
            store,
            contexts: Arc::new(ContextStore::new()),
        }
    }

    /// Volatile memory
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new()))
    }

    /// File-backed memory rooted at `dir`
    pub fn open(dir: impl Into<std::path::PathBuf>) -> Result<Self, MemoryError> {
        Ok(Self::new(Arc::new(JsonFileStore::open(dir)?)))
    }

    /// Underlying store
    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ProjectStore> {
        &self.store
    }

    /// Live contexts
    #[inline]
    #[must_use]
    pub fn contexts(&self) -> &ContextStore {
        &self.contexts
    }

    // ------------------------------------------------------------------
    // Version history
    // ------------------------------------------------------------------

    /// Append a version record; `contract_text` replaces the latest text
    pub fn record_version(
        &self,
        project_id: &str,
        record: VersionRecord,
        contract_text: Option<&str>,
    ) -> Result<(), MemoryError> {
        let text = contract_text.map(str::to_string);
        tracing::debug!(project_id, version_id = %record.version_id, "Recording version");
        self.store.update(
            project_id,
            Box::new(move |project| {
                project.versions.push(record);
                if let Some(text) = text {
                    project.latest_contract_text = Some(text);
                }
            }),
        )
    }

    /// Versions, oldest first
    pub fn version_history(&self, project_id: &str) -> Result<Vec<VersionRecord>, MemoryError> {
        Ok(self.store.load(project_id)?.versions)
    }

    /// Text of the latest version that supplied one
    pub fn latest_contract_text(&self, project_id: &str) -> Result<Option<String>, MemoryError> {
        Ok(self.store.load(project_id)?.latest_contract_text)
    }

    // ------------------------------------------------------------------
    // Preferences
    // ------------------------------------------------------------------

    /// Set a preference for `user_id`; replaces any earlier value for `key`
    pub fn record_preference(
        &self,
        project_id: &str,
        user_id: &str,
        key: &str,
        value: serde_json::Value,
        rationale: Option<String>,
        source: &str,
    ) -> Result<(), MemoryError> {
        let user = user_id.to_string();
        let pref = PreferenceRecord {
            key: key.to_string(),
            value,
            rationale,
            updated_at: Utc::now(),
            source: source.to_string(),
        };
        self.store.update(
            project_id,
            Box::new(move |project| {
                project
                    .preferences
                    .entry(user)
                    .or_default()
                    .insert(pref.key.clone(), pref);
            }),
        )
    }

    /// Preferences of one user, keyed by preference key
    pub fn preferences(
        &self,
        project_id: &str,
        user_id: &str,
    ) -> Result<BTreeMap<String, PreferenceRecord>, MemoryError> {
        Ok(self
            .store
            .load(project_id)?
            .preferences
            .remove(user_id)
            .unwrap_or_default())
    }

    // ------------------------------------------------------------------
    // Agent events
    // ------------------------------------------------------------------

    /// Append an audit event
    pub fn log_event(
        &self,
        project_id: &str,
        version_id: &str,
        agent: &str,
        action: &str,
        payload: serde_json::Value,
    ) -> Result<(), MemoryError> {
        let event = AgentEvent {
            timestamp: Utc::now(),
            agent: agent.to_string(),
            action: action.to_string(),
            version_id: version_id.to_string(),
            payload,
        };
        self.store
            .update(project_id, Box::new(move |project| project.agent_events.push(event)))
    }

    /// Audit events, oldest first
    pub fn agent_events(&self, project_id: &str) -> Result<Vec<AgentEvent>, MemoryError> {
        Ok(self.store.load(project_id)?.agent_events)
    }

    // ------------------------------------------------------------------
    // Live contexts
    // ------------------------------------------------------------------

    /// Store or replace a live context
    pub fn store_context(&self, id: ContextId, context: AnalysisContext) {
        self.contexts.store(id, context);
    }

    /// Snapshot of a live context
    #[must_use]
    pub fn context(&self, id: &ContextId) -> Option<AnalysisContext> {
        self.contexts.get(id)
    }

    /// Drop a live context
    pub fn discard_context(&self, id: &ContextId) -> Option<AnalysisContext> {
        self.contexts.discard(id)
    }
}
