//! Error types for Redline Core
//!
//! Provides error handling for:
//! - Worker failures (surfaced to the control loop, never fatal to it)
//! - Project memory persistence
//! - Worker registration
//! - Configuration loading
//! - Rationale validation
//! - Command-line file and stream access

use redline_composition::RenderError;
use redline_kernel::{ContextId, KernelError, TaskType};
use std::path::PathBuf;

/// Main core error type
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Project memory failed
    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Kernel-level parse error
    #[error("kernel error: {0}")]
    Kernel(#[from] KernelError),

    /// No live context under this id
    #[error("unknown context: {0}")]
    UnknownContext(ContextId),

    /// Input or output file access failed
    #[error("io error at {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Writing to the output stream failed
    #[error("output error: {0}")]
    Output(#[from] std::io::Error),

    /// JSON input could not be parsed or output produced
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Redline rendering failed
    #[error("render error: {0}")]
    Render(#[from] RenderError),
}

impl CoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failure reported by a worker or by one of its reasoning capabilities
#[derive(Debug, Clone, thiserror::Error)]
pub enum WorkerError {
    /// External capability call failed
    #[error("capability failed: {0}")]
    Capability(String),

    /// Capability returned output that could not be used
    #[error("invalid output: {0}")]
    InvalidOutput(String),

    /// Produced artifact failed validation
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Capability did not answer in time
    #[error("timed out after {secs}s")]
    Timeout {
        /// Elapsed seconds
        secs: u64,
    },

    /// Anything else
    #[error("{0}")]
    Internal(String),
}

impl WorkerError {
    /// Check if error is retryable
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Capability(_) | Self::Timeout { .. })
    }

    /// Short tag recorded as `error_type` on context errors
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Capability(_) => "capability",
            Self::InvalidOutput(_) => "invalid_output",
            Self::Validation(_) => "validation",
            Self::Timeout { .. } => "timeout",
            Self::Internal(_) => "internal",
        }
    }
}

/// Project memory errors
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// Filesystem access failed
    #[error("io error at {path}: {source}")]
    Io {
        /// File or directory involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Record could not be serialised
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Stored record belongs to a different project
    #[error("record for project {found} found where {expected} was expected")]
    ProjectMismatch {
        /// Project requested
        expected: String,
        /// Project named in the stored record
        found: String,
    },
}

impl MemoryError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Worker registry errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Declared capabilities overlap an existing worker
    #[error("worker {worker} overlaps {existing} on {task_type}")]
    OverlappingCapability {
        /// Worker being registered
        worker: String,
        /// Worker already holding the task type
        existing: String,
        /// Contested task type
        task_type: TaskType,
    },

    /// Worker name already taken
    #[error("duplicate worker name: {0}")]
    DuplicateName(String),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("cannot read {path}: {source}")]
    Read {
        /// Config file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// TOML syntax or type error
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Configuration could not be rendered as TOML
    #[error("serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Value out of range
    #[error("invalid value for {field}: {reason}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

/// Rationale validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Required field empty or absent
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// Non-neutral vocabulary found
    #[error("contains prohibited words: {}", .0.join(", "))]
    ProhibitedWords(Vec<String>),
}
