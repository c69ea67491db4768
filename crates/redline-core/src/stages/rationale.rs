//! Neutral rationale generation and neutrality validation

use super::{RationaleDraft, RationaleGenerator};
use crate::context::{AnalysisContext, NeutralRationale};
use crate::error::{ValidationError, WorkerError};
use crate::worker::Worker;
use async_trait::async_trait;
use chrono::Utc;
use redline_kernel::{TaskType, WorkflowStage};
use std::collections::HashSet;
use uuid::Uuid;

/// Words that carry tone or advocacy and may not appear in a neutral rationale
pub const PROHIBITED_WORDS: [&str; 15] = [
    "must",
    "should",
    "required",
    "mandatory",
    "essential",
    "consider",
    "perhaps",
    "might",
    "recommend",
    "suggest",
    "dangerous",
    "unacceptable",
    "critical",
    "urgent",
    "imperative",
];

/// Check required fields and neutral vocabulary
///
/// Only authored prose is scanned. Quotes of contract or policy language
/// (`evidence_quote`, `policy_reference`, `proposed_change.current`,
/// `proposed_change.proposed`) may legitimately contain any word.
///
/// # Errors
/// [`ValidationError::MissingField`] for the first empty required field,
/// otherwise [`ValidationError::ProhibitedWords`] listing every hit.
pub fn validate_rationale(draft: &RationaleDraft) -> Result<(), ValidationError> {
    let required = [
        ("issue_summary", &draft.issue_summary),
        ("evidence_quote", &draft.evidence_quote),
        ("policy_reference", &draft.policy_reference),
        ("impact_explanation", &draft.impact_explanation),
        ("proposed_change.proposed", &draft.proposed_change.proposed),
        ("proposed_change.reasoning", &draft.proposed_change.reasoning),
    ];
    if let Some((field, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
        return Err(ValidationError::MissingField(field));
    }

    let prose = [
        draft.issue_summary.as_str(),
        draft.impact_explanation.as_str(),
        draft.proposed_change.reasoning.as_str(),
    ]
    .into_iter()
    .chain(draft.fallback_options.iter().map(|o| o.option_text.as_str()));

    let words: HashSet<String> = prose
        .flat_map(|text| text.split(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();
    let found: Vec<String> = PROHIBITED_WORDS
        .iter()
        .filter(|w| words.contains(**w))
        .map(|w| (*w).to_string())
        .collect();

    if found.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::ProhibitedWords(found))
    }
}

/// Explains each finding in neutral language
pub struct RationaleWorker<G> {
    generator: G,
}

impl<G: RationaleGenerator> RationaleWorker<G> {
    /// Worker name
    pub const NAME: &'static str = "neutral_rationale";

    /// Create around `generator`
    #[inline]
    #[must_use]
    pub fn new(generator: G) -> Self {
        Self { generator }
    }
}

fn into_rationale(finding_id: &str, draft: RationaleDraft) -> NeutralRationale {
    let neutral_explanation = format!("{} {}", draft.issue_summary, draft.impact_explanation)
        .trim()
        .to_string();
    NeutralRationale {
        rationale_id: Uuid::new_v4().to_string(),
        finding_id: finding_id.to_string(),
        neutral_explanation,
        evidence_quote: draft.evidence_quote,
        policy_reference: draft.policy_reference,
        proposed_change: draft.proposed_change,
        fallback_options: draft.fallback_options,
        created_at: Utc::now(),
    }
}

#[async_trait]
impl<G: RationaleGenerator> Worker for RationaleWorker<G> {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn supported_tasks(&self) -> &[TaskType] {
        &[TaskType::NeutralRationale]
    }

    async fn process(&self, mut ctx: AnalysisContext) -> Result<AnalysisContext, WorkerError> {
        ctx.enter(Self::NAME);

        let mut produced = Vec::new();
        let mut rejected = Vec::new();
        for finding in &ctx.findings {
            let clause = ctx.clause(&finding.clause_id);
            let draft = match self.generator.generate(finding, clause).await {
                Ok(draft) => draft,
                Err(e) => {
                    rejected.push((finding.finding_id.clone(), e));
                    continue;
                }
            };
            match validate_rationale(&draft) {
                Ok(()) => produced.push(into_rationale(&finding.finding_id, draft)),
                Err(e) => rejected.push((finding.finding_id.clone(), e.into())),
            }
        }

        let count = produced.len();
        ctx.neutral_rationales.extend(produced);
        for (finding_id, e) in &rejected {
            tracing::warn!(finding_id = %finding_id, error = %e, "Rationale rejected");
            ctx.record_error(
                Self::NAME,
                e.kind(),
                format!("rationale for finding {finding_id}: {e}"),
            );
        }

        tracing::info!(
            version_id = %ctx.version_id,
            rationales = count,
            rejected = rejected.len(),
            "Neutral rationales generated"
        );
        ctx.advance_to(WorkflowStage::Styling);
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{
        ChangeType, Clause, FallbackOption, Finding, Provenance, ProposedChange, RiskLevel,
        Severity, StyleParams,
    };
    use pretty_assertions::assert_eq;

    fn draft(summary: &str) -> RationaleDraft {
        RationaleDraft {
            issue_summary: summary.into(),
            evidence_quote: "liability capped at 3x fees".into(),
            policy_reference: "Liability caps must not exceed 2x fees".into(),
            impact_explanation: "The cap is 1x above the policy limit.".into(),
            proposed_change: ProposedChange {
                change_type: ChangeType::ValueUpdate,
                current: Some("3x".into()),
                proposed: "2x".into(),
                reasoning: "Aligns the cap with the policy limit.".into(),
            },
            fallback_options: vec![],
        }
    }

    #[test]
    fn neutral_draft_passes() {
        assert_eq!(validate_rationale(&draft("The clause sets a 3x cap.")), Ok(()));
    }

    #[test]
    fn quoted_policy_language_is_not_scanned() {
        // "must" only appears in policy_reference
        assert!(validate_rationale(&draft("Cap differs from policy.")).is_ok());
    }

    #[test]
    fn prohibited_words_are_whole_word_and_case_insensitive() {
        let mut d = draft("This is an URGENT, critical gap.");
        d.fallback_options.push(FallbackOption {
            option_text: "You might accept 2.5x.".into(),
            conditions: vec![],
            risk_level: RiskLevel::Medium,
        });
        assert_eq!(
            validate_rationale(&d),
            Err(ValidationError::ProhibitedWords(vec![
                "might".into(),
                "critical".into(),
                "urgent".into()
            ]))
        );

        // substrings do not count
        assert!(validate_rationale(&draft("Mustard suggestions are criticalities.")).is_ok());
    }

    #[test]
    fn empty_required_field_rejected() {
        let mut d = draft("summary");
        d.proposed_change.reasoning = "  ".into();
        assert_eq!(
            validate_rationale(&d),
            Err(ValidationError::MissingField("proposed_change.reasoning"))
        );
        assert_eq!(
            validate_rationale(&draft("")),
            Err(ValidationError::MissingField("issue_summary"))
        );
    }

    struct Scripted;

    #[async_trait]
    impl RationaleGenerator for Scripted {
        async fn generate(
            &self,
            finding: &Finding,
            clause: Option<&Clause>,
        ) -> Result<RationaleDraft, WorkerError> {
            assert!(clause.is_some());
            match finding.finding_id.as_str() {
                "loud" => Ok(draft("You must fix this.")),
                "down" => Err(WorkerError::Timeout { secs: 30 }),
                _ => Ok(draft("The clause sets a 3x cap.")),
            }
        }
    }

    fn finding(id: &str) -> Finding {
        Finding {
            finding_id: id.into(),
            version_id: "v1".into(),
            clause_id: "c1".into(),
            policy_id: "p1".into(),
            deviation_type: "excessive_value".into(),
            severity: Severity::Medium,
            evidence_quote: String::new(),
            policy_requirement: String::new(),
            explanation: String::new(),
            provenance: Provenance::default(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn rejected_and_failed_rationales_become_errors() {
        let mut ctx = AnalysisContext::new(
            "v1",
            "s1",
            "",
            vec![Clause::new("c1", "text")],
            vec![],
            StyleParams::default(),
        );
        ctx.findings = vec![finding("ok"), finding("loud"), finding("down")];

        let out = RationaleWorker::new(Scripted).process(ctx).await.unwrap();

        assert_eq!(out.neutral_rationales.len(), 1);
        let r = &out.neutral_rationales[0];
        assert_eq!(r.finding_id, "ok");
        assert_eq!(
            r.neutral_explanation,
            "The clause sets a 3x cap. The cap is 1x above the policy limit."
        );
        let kinds: Vec<_> = out.errors.iter().map(|e| e.error_type.as_str()).collect();
        assert_eq!(kinds, ["validation", "timeout"]);
        assert_eq!(out.stage, WorkflowStage::Styling);
    }
}
