//! Stage machine
//!
//! Task types form a fixed linear chain that mirrors the context's stage
//! markers. Both are closed enums so every transition is checked exhaustively.

use crate::error::KernelError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of work a task performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Check clauses against policies, producing findings
    ClauseReview,
    /// Turn findings into neutral rationales
    NeutralRationale,
    /// Restyle rationales for the configured audience
    StylePass,
    /// Draft track-change edits
    EditorPass,
}

impl TaskType {
    /// Every task type in pipeline order
    pub const ALL: [TaskType; 4] = [
        TaskType::ClauseReview,
        TaskType::NeutralRationale,
        TaskType::StylePass,
        TaskType::EditorPass,
    ];

    /// Task type enqueued after this one succeeds, `None` for the terminal stage
    #[inline]
    #[must_use]
    pub fn successor(self) -> Option<TaskType> {
        match self {
            TaskType::ClauseReview => Some(TaskType::NeutralRationale),
            TaskType::NeutralRationale => Some(TaskType::StylePass),
            TaskType::StylePass => Some(TaskType::EditorPass),
            TaskType::EditorPass => None,
        }
    }

    /// Stage marker a context carries while this task runs
    #[inline]
    #[must_use]
    pub fn stage(self) -> WorkflowStage {
        match self {
            TaskType::ClauseReview => WorkflowStage::Reviewing,
            TaskType::NeutralRationale => WorkflowStage::Rationalizing,
            TaskType::StylePass => WorkflowStage::Styling,
            TaskType::EditorPass => WorkflowStage::Editing,
        }
    }

    /// Stage marker a context carries once this task has finished
    #[inline]
    #[must_use]
    pub fn finished_stage(self) -> WorkflowStage {
        self.stage().next()
    }

    /// Wire tag
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::ClauseReview => "clause_review",
            TaskType::NeutralRationale => "neutral_rationale",
            TaskType::StylePass => "style_pass",
            TaskType::EditorPass => "editor_pass",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = KernelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| KernelError::UnknownTaskType(s.to_string()))
    }
}

/// Workflow stage marker, totally ordered
///
/// Markers only move forward: `Reviewing < Rationalizing < Styling < Editing < Complete`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    /// Clause review in progress
    #[default]
    Reviewing,
    /// Rationale generation in progress
    Rationalizing,
    /// Styling in progress
    Styling,
    /// Edit drafting in progress
    Editing,
    /// Pipeline finished
    Complete,
}

impl WorkflowStage {
    /// Following stage; `Complete` is absorbing
    #[inline]
    #[must_use]
    pub fn next(self) -> WorkflowStage {
        match self {
            WorkflowStage::Reviewing => WorkflowStage::Rationalizing,
            WorkflowStage::Rationalizing => WorkflowStage::Styling,
            WorkflowStage::Styling => WorkflowStage::Editing,
            WorkflowStage::Editing | WorkflowStage::Complete => WorkflowStage::Complete,
        }
    }

    /// Whether moving from `self` to `to` keeps the marker monotonic
    #[inline]
    #[must_use]
    pub fn can_advance_to(self, to: WorkflowStage) -> bool {
        to >= self
    }

    /// Whether the pipeline has finished
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkflowStage::Complete)
    }

    /// Wire tag
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowStage::Reviewing => "reviewing",
            WorkflowStage::Rationalizing => "rationalizing",
            WorkflowStage::Styling => "styling",
            WorkflowStage::Editing => "editing",
            WorkflowStage::Complete => "complete",
        }
    }
}

impl fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowStage {
    type Err = KernelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reviewing" => Ok(WorkflowStage::Reviewing),
            "rationalizing" => Ok(WorkflowStage::Rationalizing),
            "styling" => Ok(WorkflowStage::Styling),
            "editing" => Ok(WorkflowStage::Editing),
            "complete" => Ok(WorkflowStage::Complete),
            other => Err(KernelError::UnknownStage(other.to_string())),
        }
    }
}
