//! Clause review: policy selection and bounded parallel compliance checks

use super::{Deviation, PolicyChecker, PolicyIndex};
use crate::config::RedlineConfig;
use crate::context::{AnalysisContext, Clause, Finding, Policy, Provenance};
use crate::error::WorkerError;
use crate::fanout::fan_out;
use crate::worker::Worker;
use async_trait::async_trait;
use chrono::Utc;
use redline_kernel::{TaskType, WorkflowStage};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

/// Evidence fallback length for high-risk findings without a quote
const EVIDENCE_FALLBACK_CHARS: usize = 200;

/// Reviews every clause against its relevant policies
pub struct ReviewWorker<C> {
    checker: C,
    index: Option<Arc<dyn PolicyIndex>>,
    concurrency: usize,
    max_policies_per_clause: usize,
}

impl<C: PolicyChecker> ReviewWorker<C> {
    /// Worker name
    pub const NAME: &'static str = "reviewer";

    /// Create with default limits
    #[must_use]
    pub fn new(checker: C) -> Self {
        let defaults = RedlineConfig::default();
        Self {
            checker,
            index: None,
            concurrency: defaults.review_concurrency,
            max_policies_per_clause: defaults.max_policies_per_clause,
        }
    }

    /// Create with limits taken from `config`
    #[must_use]
    pub fn from_config(checker: C, config: &RedlineConfig) -> Self {
        Self::new(checker)
            .with_concurrency(config.review_concurrency)
            .with_max_policies(config.max_policies_per_clause)
    }

    /// With similarity index for untyped clauses
    #[inline]
    #[must_use]
    pub fn with_index(mut self, index: Arc<dyn PolicyIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// With fan-out width
    #[inline]
    #[must_use]
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.concurrency = limit;
        self
    }

    /// With per-clause policy cap
    #[inline]
    #[must_use]
    pub fn with_max_policies(mut self, max: usize) -> Self {
        self.max_policies_per_clause = max;
        self
    }

    /// Policies to check `clause` against
    ///
    /// Typed clauses match on category or playbook list, first occurrence of
    /// each policy id wins. Untyped clauses go to the similarity index.
    async fn relevant_policies(
        &self,
        clause: &Clause,
        policies: &[Policy],
    ) -> Result<Vec<Policy>, WorkerError> {
        let mut relevant = match clause.clause_type.as_deref().filter(|t| !t.is_empty()) {
            Some(clause_type) => {
                let mut seen = HashSet::new();
                policies
                    .iter()
                    .filter(|p| p.applies_to(clause_type))
                    .filter(|p| seen.insert(p.policy_id.as_str()))
                    .cloned()
                    .collect()
            }
            None => match &self.index {
                Some(index) => {
                    index
                        .similar(&clause.text, self.max_policies_per_clause)
                        .await?
                }
                None => Vec::new(),
            },
        };
        relevant.truncate(self.max_policies_per_clause);
        Ok(relevant)
    }
}

fn build_finding(version_id: &str, clause: &Clause, policy: &Policy, dev: Deviation) -> Finding {
    let evidence_quote = match dev.evidence_quote.filter(|q| !q.trim().is_empty()) {
        Some(quote) => quote,
        None if dev.severity.requires_evidence() => {
            clause.text.chars().take(EVIDENCE_FALLBACK_CHARS).collect()
        }
        None => String::new(),
    };
    Finding {
        finding_id: Uuid::new_v4().to_string(),
        version_id: version_id.to_string(),
        clause_id: clause.clause_id.clone(),
        policy_id: policy.policy_id.clone(),
        deviation_type: dev.deviation_type,
        severity: dev.severity,
        evidence_quote,
        policy_requirement: policy.text.clone(),
        explanation: dev.explanation,
        provenance: Provenance {
            retrieval_sources: vec![policy.policy_id.clone()],
            reviewer_id: "reviewer".to_string(),
            policy_version: policy.version.clone(),
            policy_category: policy.category.clone(),
        },
        created_at: Utc::now(),
    }
}

#[async_trait]
impl<C: PolicyChecker> Worker for ReviewWorker<C> {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn supported_tasks(&self) -> &[TaskType] {
        &[TaskType::ClauseReview]
    }

    async fn process(&self, mut ctx: AnalysisContext) -> Result<AnalysisContext, WorkerError> {
        ctx.enter(Self::NAME);
        let version_id = ctx.version_id.clone();

        let mut seen = HashSet::new();
        let mut pairs: Vec<(&Clause, Policy)> = Vec::new();
        let mut lookup_errors = Vec::new();
        for clause in &ctx.clauses {
            match self.relevant_policies(clause, &ctx.policies).await {
                Ok(policies) => {
                    for policy in policies {
                        if seen.insert((clause.clause_id.clone(), policy.policy_id.clone())) {
                            pairs.push((clause, policy));
                        }
                    }
                }
                Err(e) => lookup_errors.push((clause.clause_id.clone(), e)),
            }
        }

        let labels: Vec<String> = pairs
            .iter()
            .map(|(c, p)| format!("{}/{}", c.clause_id, p.policy_id))
            .collect();
        let checker = &self.checker;
        let version_id = version_id.as_str();
        let out = fan_out(pairs, self.concurrency, |(clause, policy)| async move {
            let deviation = checker.check(clause, &policy).await?;
            Ok::<_, WorkerError>(deviation.map(|d| build_finding(version_id, clause, &policy, d)))
        })
        .await;

        for (clause_id, e) in lookup_errors {
            tracing::warn!(clause_id = %clause_id, error = %e, "Policy lookup failed");
            ctx.record_error(
                Self::NAME,
                e.kind(),
                format!("policy lookup failed for clause {clause_id}: {e}"),
            );
        }
        let mut found = 0usize;
        for (label, result) in labels.into_iter().zip(out.results) {
            match result {
                Ok(Some(finding)) => {
                    ctx.findings.push(finding);
                    found += 1;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(pair = %label, error = %e, "Policy check failed");
                    ctx.record_error(Self::NAME, e.kind(), format!("policy check {label} failed: {e}"));
                }
            }
        }

        tracing::info!(
            version_id = %ctx.version_id,
            checks = out.report.total(),
            failed = out.report.failed,
            findings = found,
            "Clause review finished"
        );
        ctx.advance_to(WorkflowStage::Rationalizing);
        Ok(ctx)
    }
}
