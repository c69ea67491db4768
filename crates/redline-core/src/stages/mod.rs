//! The four pipeline stage workers
//!
//! Each worker is an orchestration shell around an opaque reasoning
//! capability. The capability decides *what* to produce; the shell owns
//! selection, fan-out, merging, validation, caching and stage advancement.
//!
//! | task type | worker | capability |
//! |---|---|---|
//! | `clause_review` | [`ReviewWorker`] | [`PolicyChecker`] (+ optional [`PolicyIndex`]) |
//! | `neutral_rationale` | [`RationaleWorker`] | [`RationaleGenerator`] |
//! | `style_pass` | [`StyleWorker`] | [`Stylist`] |
//! | `editor_pass` | [`EditorWorker`] | [`EditDrafter`] |

mod cache;
mod editor;
mod rationale;
mod review;
mod style;

pub use cache::TransformationCache;
pub use editor::EditorWorker;
pub use rationale::{validate_rationale, RationaleWorker, PROHIBITED_WORDS};
pub use review::ReviewWorker;
pub use style::StyleWorker;

use crate::context::{
    Clause, FallbackOption, Finding, NeutralRationale, Policy, ProposedChange, Severity,
    StyleParams, StyledRationale,
};
use crate::error::WorkerError;
use async_trait::async_trait;
use redline_composition::{Deletion, Insertion};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A deviation reported by a [`PolicyChecker`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deviation {
    /// missing_clause | excessive_value | prohibited_term | incomplete_requirement
    pub deviation_type: String,
    /// Severity
    pub severity: Severity,
    /// Quote from the clause, if the checker gave one
    #[serde(default)]
    pub evidence_quote: Option<String>,
    /// One-sentence explanation
    #[serde(default)]
    pub explanation: String,
}

/// Raw rationale as produced by a [`RationaleGenerator`], before validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RationaleDraft {
    /// One-sentence objective description
    pub issue_summary: String,
    /// Quote from the clause
    pub evidence_quote: String,
    /// Policy cited
    pub policy_reference: String,
    /// How the clause differs from policy
    pub impact_explanation: String,
    /// Proposed change
    pub proposed_change: ProposedChange,
    /// Fallbacks
    #[serde(default)]
    pub fallback_options: Vec<FallbackOption>,
}

/// Track-change body produced by an [`EditDrafter`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditDraft {
    /// value_change | text_replacement | clause_insertion | clause_deletion
    pub edit_type: String,
    /// Deleted ranges, char offsets into the clause text
    #[serde(default)]
    pub deletions: Vec<Deletion>,
    /// Insertions, char offsets into the clause text
    #[serde(default)]
    pub insertions: Vec<Insertion>,
    /// Clause text after the edit
    pub resulting_text: String,
    /// One-line summary
    pub change_summary: String,
}

/// Decides whether a clause deviates from a policy
#[async_trait]
pub trait PolicyChecker: Send + Sync {
    /// `Ok(None)` means compliant
    async fn check(&self, clause: &Clause, policy: &Policy)
        -> Result<Option<Deviation>, WorkerError>;
}

/// Similarity search over policies, used for clauses without a type
#[async_trait]
pub trait PolicyIndex: Send + Sync {
    /// Up to `limit` policies most similar to `text`
    async fn similar(&self, text: &str, limit: usize) -> Result<Vec<Policy>, WorkerError>;
}

/// Explains a finding without tone
#[async_trait]
pub trait RationaleGenerator: Send + Sync {
    /// Draft a rationale for `finding`
    async fn generate(
        &self,
        finding: &Finding,
        clause: Option<&Clause>,
    ) -> Result<RationaleDraft, WorkerError>;
}

/// Restyles a neutral rationale for an audience
#[async_trait]
pub trait Stylist: Send + Sync {
    /// Restyled text
    async fn restyle(
        &self,
        rationale: &NeutralRationale,
        style: &StyleParams,
        finding: Option<&Finding>,
    ) -> Result<String, WorkerError>;
}

/// Turns a rationale into a concrete track-change edit
#[async_trait]
pub trait EditDrafter: Send + Sync {
    /// Draft an edit of `clause`
    async fn draft(
        &self,
        clause: &Clause,
        rationale: &NeutralRationale,
        styled: &StyledRationale,
    ) -> Result<EditDraft, WorkerError>;
}

#[async_trait]
impl<T: PolicyChecker + ?Sized> PolicyChecker for Arc<T> {
    async fn check(
        &self,
        clause: &Clause,
        policy: &Policy,
    ) -> Result<Option<Deviation>, WorkerError> {
        (**self).check(clause, policy).await
    }
}

#[async_trait]
impl<T: RationaleGenerator + ?Sized> RationaleGenerator for Arc<T> {
    async fn generate(
        &self,
        finding: &Finding,
        clause: Option<&Clause>,
    ) -> Result<RationaleDraft, WorkerError> {
        (**self).generate(finding, clause).await
    }
}

#[async_trait]
impl<T: Stylist + ?Sized> Stylist for Arc<T> {
    async fn restyle(
        &self,
        rationale: &NeutralRationale,
        style: &StyleParams,
        finding: Option<&Finding>,
    ) -> Result<String, WorkerError> {
        (**self).restyle(rationale, style, finding).await
    }
}

#[async_trait]
impl<T: EditDrafter + ?Sized> EditDrafter for Arc<T> {
    async fn draft(
        &self,
        clause: &Clause,
        rationale: &NeutralRationale,
        styled: &StyledRationale,
    ) -> Result<EditDraft, WorkerError> {
        (**self).draft(clause, rationale, styled).await
    }
}
