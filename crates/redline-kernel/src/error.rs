//! Error types for the kernel

/// Errors raised while parsing or validating kernel values
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KernelError {
    /// A task type tag outside the closed set
    #[error("unknown task type: {0}")]
    UnknownTaskType(String),

    /// A stage marker outside the closed set
    #[error("unknown workflow stage: {0}")]
    UnknownStage(String),

    /// Context identifiers are `project:version`
    #[error("malformed context id: {0}")]
    MalformedContextId(String),
}
