//! Core kernel types
//!
//! Defines the fundamental scheduling types:
//! - Task and context identifiers
//! - Task payloads and queued tasks
//! - Completion outcomes and the permanent completion record

use crate::error::KernelError;
use crate::stage::TaskType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Unique task identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Ulid);

impl TaskId {
    /// Generate new task ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one analysis context: `project:version`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(String);

impl ContextId {
    /// Build the id for a (project, version) pair
    #[inline]
    #[must_use]
    pub fn new(project_id: &str, version_id: &str) -> Self {
        Self(format!("{project_id}:{version_id}"))
    }

    /// Raw string form
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split back into `(project, version)`
    #[must_use]
    pub fn parts(&self) -> Option<(&str, &str)> {
        self.0.split_once(':')
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ContextId {
    type Err = KernelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((project, version)) if !project.is_empty() && !version.is_empty() => {
                Ok(Self(s.to_string()))
            }
            _ => Err(KernelError::MalformedContextId(s.to_string())),
        }
    }
}

/// Data every task carries to locate its context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPayload {
    /// Context the task reads and writes
    pub context_id: ContextId,
    /// Owning project
    pub project_id: String,
    /// Document version under analysis
    pub version_id: String,
    /// Negotiation session that ingested the version
    pub session_id: String,
}

impl TaskPayload {
    /// Create a payload; the context id is parsed leniently from `context_id`
    #[must_use]
    pub fn new(
        context_id: &str,
        project_id: impl Into<String>,
        version_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            context_id: ContextId(context_id.to_string()),
            project_id: project_id.into(),
            version_id: version_id.into(),
            session_id: session_id.into(),
        }
    }

    /// Payload for a context id built from its parts
    #[must_use]
    pub fn for_context(context_id: ContextId, project_id: &str, version_id: &str, session_id: &str) -> Self {
        Self {
            context_id,
            project_id: project_id.to_string(),
            version_id: version_id.to_string(),
            session_id: session_id.to_string(),
        }
    }
}

/// A schedulable unit of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Task ID
    pub id: TaskId,
    /// Task type
    pub task_type: TaskType,
    /// Priority (lower is served sooner)
    pub priority: u32,
    /// Creation order, strictly increasing per queue
    pub seq: u64,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Context locator
    pub payload: TaskPayload,
    /// Task that must complete first
    pub depends_on: Option<TaskId>,
    /// Number of times this task was found blocked on its dependency
    pub polls: u32,
}

/// Whether a successful task expanded the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// A successor task was enqueued
    Continued,
    /// The pipeline ended at this task
    Terminal,
}

/// Result stored when a task leaves the queue for good
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskOutcome {
    /// Worker ran and its context was persisted
    Succeeded {
        /// Graph expansion status
        status: StageStatus,
        /// Free-form note from the controller
        notes: Option<String>,
    },
    /// No registered worker accepts the task type
    NoCapableWorker,
    /// The referenced context is not in the store
    MissingContext,
    /// Worker returned an error
    Failed {
        /// Error text
        error: String,
    },
    /// Dependency never completed within the re-poll bound
    Blocked {
        /// Dependency that was never satisfied
        waiting_on: TaskId,
        /// Re-polls observed before giving up
        polls: u32,
    },
}

impl TaskOutcome {
    /// Successful outcome
    #[inline]
    #[must_use]
    pub fn succeeded(status: StageStatus, notes: Option<String>) -> Self {
        Self::Succeeded { status, notes }
    }

    /// Failed outcome from any displayable error
    #[inline]
    #[must_use]
    pub fn failed(error: impl fmt::Display) -> Self {
        Self::Failed {
            error: error.to_string(),
        }
    }

    /// Whether the task ended in an error terminal
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        !matches!(self, Self::Succeeded { .. })
    }

    /// Short error tag, `None` on success
    #[must_use]
    pub fn error_tag(&self) -> Option<&'static str> {
        match self {
            Self::Succeeded { .. } => None,
            Self::NoCapableWorker => Some("no_agent"),
            Self::MissingContext => Some("missing_context"),
            Self::Failed { .. } => Some("error"),
            Self::Blocked { .. } => Some("blocked"),
        }
    }
}

/// Permanent record of a finished task; doubles as the dependency ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedTask {
    /// Task type
    pub task_type: TaskType,
    /// Payload the task ran with
    pub payload: TaskPayload,
    /// Priority at completion (includes re-poll penalties)
    pub priority: u32,
    /// Completion time
    pub completed_at: DateTime<Utc>,
    /// Outcome
    pub outcome: TaskOutcome,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_id_parts() {
        let id = ContextId::new("acme", "v2");
        assert_eq!(id.as_str(), "acme:v2");
        assert_eq!(id.parts(), Some(("acme", "v2")));
        assert!("acme".parse::<ContextId>().is_err());
        assert!(":v1".parse::<ContextId>().is_err());
        assert_eq!("acme:v1".parse::<ContextId>().unwrap(), ContextId::new("acme", "v1"));
    }

    #[test]
    fn outcome_tags() {
        assert_eq!(TaskOutcome::succeeded(StageStatus::Terminal, None).error_tag(), None);
        assert_eq!(TaskOutcome::NoCapableWorker.error_tag(), Some("no_agent"));
        assert!(TaskOutcome::failed("boom").is_error());
        assert!(TaskOutcome::MissingContext.is_error());
    }

    #[test]
    fn outcome_serializes_tagged() {
        let json = serde_json::to_value(TaskOutcome::failed("boom")).unwrap();
        assert_eq!(json["kind"], "failed");
        assert_eq!(json["error"], "boom");
    }

    #[test]
    fn task_ids_are_unique() {
        assert_ne!(TaskId::new(), TaskId::new());
    }
}
