//! Redline Core - contract review orchestration
//!
//! The layer that turns a document version into findings, rationales and
//! conflict-annotated track changes:
//! - A shared analysis context per (project, version)
//! - Durable project memory (versions, preferences, audit events)
//! - A worker registry with disjoint capabilities
//! - Four stage workers wrapping opaque reasoning capabilities
//! - The control loop that drains the task queue
//!
//! # Example
//!
//! ```rust,ignore
//! use redline_core::{IngestRequest, Orchestrator, WorkerRegistry};
//!
//! # async fn example(registry: WorkerRegistry) -> Result<(), redline_core::CoreError> {
//! let orchestrator = Orchestrator::in_memory(registry);
//! let id = orchestrator.ingest(IngestRequest::new("acme", "session-1", "v1", "..."))?;
//!
//! let report = orchestrator.run(25).await;
//! let result = orchestrator.build_result(&id).expect("context exists");
//! println!("{} tasks, {} edits", report.iterations, result.summary.total_edits);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod cli;
pub mod config;
pub mod context;
pub mod diff;
pub mod error;
pub mod fanout;
pub mod memory;
pub mod orchestrator;
pub mod stages;
pub mod worker;

pub use config::RedlineConfig;
pub use context::{
    AnalysisContext, ChangeType, Clause, ContextError, ContextStore, FallbackOption, Finding,
    NeutralRationale, Policy, ProposedChange, Provenance, RiskLevel, Severity, StyleParams,
    StyledRationale,
};
pub use diff::unified_diff;
pub use error::{
    ConfigError, CoreError, MemoryError, RegistryError, ValidationError, WorkerError,
};
pub use fanout::{fan_out, FanOut, FanOutReport};
pub use memory::{
    AgentEvent, InMemoryStore, JsonFileStore, PreferenceRecord, ProjectMemory, ProjectRecord,
    ProjectStore, VersionRecord,
};
pub use orchestrator::{
    AnalysisResult, AnalysisSummary, IngestRequest, Orchestrator, RunReport,
};
pub use stages::{
    validate_rationale, Deviation, EditDraft, EditDrafter, EditorWorker, PolicyChecker,
    PolicyIndex, RationaleDraft, RationaleGenerator, RationaleWorker, ReviewWorker, StyleWorker,
    Stylist, TransformationCache,
};
pub use worker::{FnWorker, Worker, WorkerRegistry};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for wiring an orchestrator
    pub use crate::{
        AnalysisContext, IngestRequest, Orchestrator, ProjectMemory, RedlineConfig, Worker,
        WorkerError, WorkerRegistry,
    };
    pub use redline_kernel::{ContextId, TaskType, WorkflowStage};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
