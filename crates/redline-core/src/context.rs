//! Analysis context (the shared blackboard) and its in-memory store
//!
//! One [`AnalysisContext`] exists per (project, version). Workers take it by
//! value, append their outputs and hand it back; the orchestrator writes the
//! returned value into the [`ContextStore`].

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use redline_composition::SuggestedEdit;
use redline_kernel::{ContextId, WorkflowStage};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A clause extracted from the contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clause {
    /// Clause ID
    pub clause_id: String,
    /// Human label, e.g. "5.1" or "Limitation of Liability"
    #[serde(default, alias = "clause_identifier")]
    pub identifier: String,
    /// Category used for policy matching
    #[serde(default)]
    pub clause_type: Option<String>,
    /// Clause text
    #[serde(alias = "clause_text")]
    pub text: String,
    /// Char offset of the clause in the contract
    #[serde(default)]
    pub char_start: usize,
    /// Char offset one past the clause end
    #[serde(default)]
    pub char_end: usize,
}

impl Clause {
    /// Create a clause
    #[must_use]
    pub fn new(clause_id: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            clause_id: clause_id.into(),
            identifier: String::new(),
            clause_type: None,
            char_start: 0,
            char_end: text.chars().count(),
            text,
        }
    }

    /// With clause type
    #[inline]
    #[must_use]
    pub fn with_type(mut self, clause_type: impl Into<String>) -> Self {
        self.clause_type = Some(clause_type.into());
        self
    }
}

/// A policy or playbook rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Policy ID
    pub policy_id: String,
    /// Requirement text
    #[serde(alias = "policy_text")]
    pub text: String,
    /// Clause type this policy governs
    #[serde(default, alias = "policy_category")]
    pub category: String,
    /// Additional clause types a playbook rule applies to
    #[serde(default)]
    pub applicable_clauses: Vec<String>,
    /// Policy version
    #[serde(default, alias = "policy_version")]
    pub version: Option<String>,
}

impl Policy {
    /// Create a policy
    #[must_use]
    pub fn new(
        policy_id: impl Into<String>,
        category: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            policy_id: policy_id.into(),
            text: text.into(),
            category: category.into(),
            applicable_clauses: Vec::new(),
            version: None,
        }
    }

    /// Whether the policy governs a clause of `clause_type`
    #[must_use]
    pub fn applies_to(&self, clause_type: &str) -> bool {
        self.category == clause_type || self.applicable_clauses.iter().any(|c| c == clause_type)
    }
}

/// Presentation parameters for the style stage
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleParams {
    /// concise | verbose | balanced
    pub tone: String,
    /// legal | plain_english
    pub formality: String,
    /// strict | balanced | flexible
    pub aggressiveness: String,
    /// internal | counterparty
    pub audience: String,
}

impl Default for StyleParams {
    fn default() -> Self {
        Self {
            tone: "concise".to_string(),
            formality: "legal".to_string(),
            aggressiveness: "balanced".to_string(),
            audience: "internal".to_string(),
        }
    }
}

/// Finding severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Minor deviation
    Low,
    /// Negotiable risk
    Medium,
    /// Significant financial or operational risk
    High,
    /// Deal-breaker or regulatory risk
    Critical,
    /// Anything a capability reported that is not one of the above
    #[serde(other)]
    Unknown,
}

impl Severity {
    /// Lowercase tag
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
            Self::Unknown => "unknown",
        }
    }

    /// High and critical findings must carry an evidence quote
    #[inline]
    #[must_use]
    pub fn requires_evidence(self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a finding came from
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Provenance {
    /// Policies consulted
    pub retrieval_sources: Vec<String>,
    /// Worker that produced the finding
    pub reviewer_id: String,
    /// Policy version at review time
    pub policy_version: Option<String>,
    /// Policy category at review time
    pub policy_category: String,
}

/// A policy deviation found in a clause
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Finding ID
    pub finding_id: String,
    /// Version the finding belongs to
    pub version_id: String,
    /// Clause reviewed
    pub clause_id: String,
    /// Policy violated
    pub policy_id: String,
    /// Kind of deviation
    pub deviation_type: String,
    /// Severity
    pub severity: Severity,
    /// Quote from the clause
    pub evidence_quote: String,
    /// Requirement text of the policy
    pub policy_requirement: String,
    /// One-sentence objective explanation
    pub explanation: String,
    /// Provenance
    pub provenance: Provenance,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Kind of change a rationale proposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// Change a number, date or amount
    ValueUpdate,
    /// Replace wording
    TextReplacement,
    /// Add a clause
    ClauseInsertion,
    /// Remove a clause
    ClauseDeletion,
}

/// The change a neutral rationale proposes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedChange {
    /// Kind of change
    pub change_type: ChangeType,
    /// Current text or value
    #[serde(default)]
    pub current: Option<String>,
    /// Proposed text or value
    pub proposed: String,
    /// Why the change aligns with policy
    pub reasoning: String,
}

/// Risk of accepting a fallback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Low risk
    Low,
    /// Medium risk
    Medium,
    /// High risk
    High,
}

/// Alternative wording acceptable under conditions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackOption {
    /// Alternative wording
    pub option_text: String,
    /// Prerequisites
    #[serde(default)]
    pub conditions: Vec<String>,
    /// Risk of accepting
    pub risk_level: RiskLevel,
}

/// Tone-free explanation of a finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeutralRationale {
    /// Rationale ID
    pub rationale_id: String,
    /// Finding explained
    pub finding_id: String,
    /// Summary and impact
    pub neutral_explanation: String,
    /// Quote from the clause
    pub evidence_quote: String,
    /// Policy cited
    pub policy_reference: String,
    /// Proposed change
    pub proposed_change: ProposedChange,
    /// Fallbacks
    #[serde(default)]
    pub fallback_options: Vec<FallbackOption>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// A rationale restyled for its audience
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyledRationale {
    /// Transformation ID
    pub transformation_id: String,
    /// Source rationale
    pub rationale_id: String,
    /// Style applied
    pub style: StyleParams,
    /// Restyled text
    pub text: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Error recorded on a context; the list is append-only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextError {
    /// Worker or component that hit the error
    pub agent: String,
    /// Short machine tag
    pub error_type: String,
    /// Human-readable message
    pub message: String,
    /// When it happened
    pub timestamp: DateTime<Utc>,
}

/// Blackboard for one contract version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisContext {
    /// Version under analysis
    pub version_id: String,
    /// Negotiation session
    pub session_id: String,
    /// Full contract text
    pub contract_text: String,
    /// Extracted clauses
    pub clauses: Vec<Clause>,
    /// Applicable policies
    pub policies: Vec<Policy>,
    /// Style for the style stage
    pub style: StyleParams,

    /// Review stage output
    pub findings: Vec<Finding>,
    /// Rationale stage output
    pub neutral_rationales: Vec<NeutralRationale>,
    /// Style stage output
    pub styled_rationales: Vec<StyledRationale>,
    /// Editor stage output
    pub suggested_edits: Vec<SuggestedEdit>,

    /// Pipeline position
    pub stage: WorkflowStage,
    /// Last worker to take the context
    pub current_worker: Option<String>,
    /// Errors, in order
    pub errors: Vec<ContextError>,
    /// Creation time
    pub started_at: DateTime<Utc>,
    /// Last modification, never moves backwards
    pub updated_at: DateTime<Utc>,
}

impl AnalysisContext {
    /// Fresh context at the `Reviewing` stage with empty outputs
    #[must_use]
    pub fn new(
        version_id: impl Into<String>,
        session_id: impl Into<String>,
        contract_text: impl Into<String>,
        clauses: Vec<Clause>,
        policies: Vec<Policy>,
        style: StyleParams,
    ) -> Self {
        let now = Utc::now();
        Self {
            version_id: version_id.into(),
            session_id: session_id.into(),
            contract_text: contract_text.into(),
            clauses,
            policies,
            style,
            findings: Vec::new(),
            neutral_rationales: Vec::new(),
            styled_rationales: Vec::new(),
            suggested_edits: Vec::new(),
            stage: WorkflowStage::Reviewing,
            current_worker: None,
            errors: Vec::new(),
            started_at: now,
            updated_at: now,
        }
    }

    /// Bump `updated_at`, keeping it monotonic
    pub fn touch(&mut self) {
        let now = Utc::now();
        if now > self.updated_at {
            self.updated_at = now;
        }
    }

    /// Mark `worker` as the current holder
    pub fn enter(&mut self, worker: &str) {
        self.current_worker = Some(worker.to_string());
        self.touch();
    }

    /// Move the stage marker forward; backward moves are ignored
    pub fn advance_to(&mut self, stage: WorkflowStage) -> bool {
        if self.stage.can_advance_to(stage) {
            self.stage = stage;
            self.touch();
            true
        } else {
            tracing::debug!(from = %self.stage, to = %stage, "Ignoring backward stage move");
            false
        }
    }

    /// Append an error
    pub fn record_error(
        &mut self,
        agent: impl Into<String>,
        error_type: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.errors.push(ContextError {
            agent: agent.into(),
            error_type: error_type.into(),
            message: message.into(),
            timestamp: Utc::now(),
        });
        self.touch();
    }

    /// Clause by ID
    #[must_use]
    pub fn clause(&self, clause_id: &str) -> Option<&Clause> {
        self.clauses.iter().find(|c| c.clause_id == clause_id)
    }

    /// Finding by ID
    #[must_use]
    pub fn finding(&self, finding_id: &str) -> Option<&Finding> {
        self.findings.iter().find(|f| f.finding_id == finding_id)
    }

    /// Neutral rationale by ID
    #[must_use]
    pub fn rationale(&self, rationale_id: &str) -> Option<&NeutralRationale> {
        self.neutral_rationales
            .iter()
            .find(|r| r.rationale_id == rationale_id)
    }
}

/// Live contexts keyed by `"{project}:{version}"`; not persisted
#[derive(Debug, Default)]
pub struct ContextStore {
    contexts: DashMap<ContextId, AnalysisContext>,
}

impl ContextStore {
    /// Create an empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace
    pub fn store(&self, id: ContextId, context: AnalysisContext) {
        self.contexts.insert(id, context);
    }

    /// Snapshot of a context
    #[must_use]
    pub fn get(&self, id: &ContextId) -> Option<AnalysisContext> {
        self.contexts.get(id).map(|entry| entry.value().clone())
    }

    /// Mutate a context in place; returns `false` if absent
    pub fn update(&self, id: &ContextId, f: impl FnOnce(&mut AnalysisContext)) -> bool {
        match self.contexts.get_mut(id) {
            Some(mut entry) => {
                f(entry.value_mut());
                true
            }
            None => false,
        }
    }

    /// Drop a context
    pub fn discard(&self, id: &ContextId) -> Option<AnalysisContext> {
        self.contexts.remove(id).map(|(_, ctx)| ctx)
    }

    /// Whether a context exists
    #[must_use]
    pub fn contains(&self, id: &ContextId) -> bool {
        self.contexts.contains_key(id)
    }

    /// Number of live contexts
    #[must_use]
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}
