//! Suggested edit model
//!
//! Offsets are character positions. Deletions are half-open `[start, end)`;
//! an insertion is a single point.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique edit identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EditId(pub String);

impl EditId {
    /// Generate a new random edit ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for EditId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for EditId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EditId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for EditId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Half-open character range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CharRange {
    /// Inclusive start
    pub start: usize,
    /// Exclusive end
    pub end: usize,
}

impl CharRange {
    /// Create a range; an inverted range collapses to empty at `start`
    #[inline]
    #[must_use]
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    /// Two ranges intersect unless one ends at or before the other starts
    #[inline]
    #[must_use]
    pub fn overlaps(&self, other: &CharRange) -> bool {
        !(self.end <= other.start || other.end <= self.start)
    }
}

/// Text removed by an edit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deletion {
    /// First deleted char
    #[serde(alias = "start_char")]
    pub start: usize,
    /// One past the last deleted char
    #[serde(alias = "end_char")]
    pub end: usize,
    /// Literal deleted text
    pub deleted_text: String,
}

/// Text added by an edit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Insertion {
    /// Insertion point
    #[serde(alias = "position_char")]
    pub position: usize,
    /// Literal inserted text
    pub inserted_text: String,
}

/// Policy the edit answers to
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PolicyAnchor {
    /// Policy ID
    pub policy_id: String,
    /// Requirement text
    pub policy_requirement: String,
    /// Kind of deviation found
    pub deviation_type: String,
    /// Severity tag of the underlying finding
    pub severity: String,
}

/// Review workflow status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditStatus {
    /// Awaiting a decision
    #[default]
    Pending,
    /// Applied by a reviewer
    Accepted,
    /// Declined by a reviewer
    Rejected,
}

/// Track-change edit proposed for one clause
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedEdit {
    /// Edit ID
    pub edit_id: EditId,
    /// Finding this edit resolves
    pub finding_id: String,
    /// Neutral rationale behind it
    #[serde(default)]
    pub rationale_id: String,
    /// Styled rationale behind it
    #[serde(default)]
    pub transformation_id: String,
    /// Clause the edit targets
    pub clause_id: String,
    /// Kind of change (free-form tag)
    #[serde(default)]
    pub edit_type: String,
    /// Deleted ranges
    #[serde(default)]
    pub deletions: Vec<Deletion>,
    /// Insertion points
    #[serde(default)]
    pub insertions: Vec<Insertion>,
    /// Clause text after the edit
    #[serde(default)]
    pub resulting_text: String,
    /// One-line summary
    #[serde(default)]
    pub change_summary: String,
    /// Policy anchor
    #[serde(default)]
    pub policy_anchor: Option<PolicyAnchor>,
    /// Styled explanation for display
    #[serde(default)]
    pub explanation: String,
    /// Review status
    #[serde(default)]
    pub status: EditStatus,
    /// Edits whose affected ranges intersect this one
    #[serde(default)]
    pub conflicts_with: Vec<EditId>,
    /// Creation time
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl SuggestedEdit {
    /// Create an empty edit for a clause
    #[must_use]
    pub fn new(clause_id: impl Into<String>, finding_id: impl Into<String>) -> Self {
        Self {
            edit_id: EditId::new(),
            finding_id: finding_id.into(),
            rationale_id: String::new(),
            transformation_id: String::new(),
            clause_id: clause_id.into(),
            edit_type: String::new(),
            deletions: Vec::new(),
            insertions: Vec::new(),
            resulting_text: String::new(),
            change_summary: String::new(),
            policy_anchor: None,
            explanation: String::new(),
            status: EditStatus::Pending,
            conflicts_with: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// With a fixed edit ID
    #[inline]
    #[must_use]
    pub fn with_id(mut self, id: impl Into<EditId>) -> Self {
        self.edit_id = id.into();
        self
    }

    /// Add a deletion
    #[inline]
    #[must_use]
    pub fn with_deletion(mut self, start: usize, end: usize, text: impl Into<String>) -> Self {
        self.deletions.push(Deletion {
            start,
            end,
            deleted_text: text.into(),
        });
        self
    }

    /// Add an insertion
    #[inline]
    #[must_use]
    pub fn with_insertion(mut self, position: usize, text: impl Into<String>) -> Self {
        self.insertions.push(Insertion {
            position,
            inserted_text: text.into(),
        });
        self
    }

    /// Ranges this edit touches
    ///
    /// An insertion point `p` is widened to `[p, p + 1)` so two insertions at
    /// the same point, or an insertion right at a deletion's start, conflict.
    /// A point at `usize::MAX` is clamped to the last unit range.
    #[must_use]
    pub fn affected_ranges(&self) -> Vec<CharRange> {
        self.deletions
            .iter()
            .map(|d| CharRange::new(d.start, d.end))
            .chain(self.insertions.iter().map(|i| {
                let start = i.position.min(usize::MAX - 1);
                CharRange::new(start, start + 1)
            }))
            .collect()
    }

    /// Whether any affected range of `self` intersects one of `other`
    #[must_use]
    pub fn overlaps(&self, other: &SuggestedEdit) -> bool {
        let theirs = other.affected_ranges();
        self.affected_ranges()
            .iter()
            .any(|mine| theirs.iter().any(|r| mine.overlaps(r)))
    }

    /// Record a conflict with `other`, ignoring duplicates
    pub fn mark_conflict(&mut self, other: &EditId) {
        if other != &self.edit_id && !self.conflicts_with.contains(other) {
            self.conflicts_with.push(other.clone());
        }
    }

    /// Whether any conflict was recorded
    #[inline]
    #[must_use]
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts_with.is_empty()
    }
}
