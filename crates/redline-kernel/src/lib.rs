//! Redline Kernel
//!
//! The scheduling layer underneath the review pipeline:
//! - Task identifiers, payloads and completion outcomes
//! - The fixed stage machine (`clause_review -> neutral_rationale -> style_pass -> editor_pass`)
//! - A priority queue with dependency gating and a bounded re-poll terminal
//!
//! # Example
//!
//! ```rust
//! use redline_kernel::{TaskPayload, TaskQueue, TaskType, TaskOutcome, StageStatus};
//!
//! let mut queue = TaskQueue::new();
//! let payload = TaskPayload::new("acme:v1", "acme", "v1", "session-1");
//! let first = queue.enqueue(TaskType::ClauseReview, payload.clone(), 1, None);
//! let second = queue.enqueue(TaskType::NeutralRationale, payload, 2, Some(first));
//!
//! let task = queue.dequeue().unwrap();
//! assert_eq!(task.id, first);
//! // `second` is gated on `first`
//! assert!(queue.dequeue().is_none());
//!
//! queue.mark_complete(first, TaskOutcome::succeeded(StageStatus::Continued, None));
//! assert_eq!(queue.dequeue().unwrap().id, second);
//! ```

#![warn(unreachable_pub)]

pub mod error;
pub mod queue;
pub mod stage;
pub mod types;

pub use error::KernelError;
pub use queue::{TaskQueue, DEFAULT_MAX_DEPENDENCY_POLLS};
pub use stage::{TaskType, WorkflowStage};
pub use types::{
    CompletedTask, ContextId, StageStatus, Task, TaskId, TaskOutcome, TaskPayload,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
