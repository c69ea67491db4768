//! Track-change drafting and conflict marking

use super::EditDrafter;
use crate::context::{AnalysisContext, Clause, Finding, NeutralRationale, StyledRationale};
use crate::error::WorkerError;
use crate::worker::Worker;
use async_trait::async_trait;
use redline_composition::{
    resolve_conflicts, ConflictStrategy, PairwiseResolver, PolicyAnchor, SuggestedEdit,
};
use redline_kernel::{TaskType, WorkflowStage};

/// Drafts one suggested edit per styled rationale
pub struct EditorWorker<E> {
    drafter: E,
    strategy: Box<dyn ConflictStrategy>,
}

impl<E: EditDrafter> EditorWorker<E> {
    /// Worker name
    pub const NAME: &'static str = "editor";

    /// Create with pairwise conflict detection
    #[must_use]
    pub fn new(drafter: E) -> Self {
        Self {
            drafter,
            strategy: Box::new(PairwiseResolver),
        }
    }

    /// With conflict detection strategy
    #[must_use]
    pub fn with_strategy(mut self, strategy: impl ConflictStrategy + 'static) -> Self {
        self.strategy = Box::new(strategy);
        self
    }

    async fn draft(
        &self,
        clause: &Clause,
        finding: &Finding,
        rationale: &NeutralRationale,
        styled: &StyledRationale,
    ) -> Result<SuggestedEdit, WorkerError> {
        let draft = self.drafter.draft(clause, rationale, styled).await?;
        Ok(SuggestedEdit {
            rationale_id: rationale.rationale_id.clone(),
            transformation_id: styled.transformation_id.clone(),
            edit_type: draft.edit_type,
            deletions: draft.deletions,
            insertions: draft.insertions,
            resulting_text: draft.resulting_text,
            change_summary: draft.change_summary,
            policy_anchor: Some(PolicyAnchor {
                policy_id: finding.policy_id.clone(),
                policy_requirement: finding.policy_requirement.clone(),
                deviation_type: finding.deviation_type.clone(),
                severity: finding.severity.to_string(),
            }),
            explanation: styled.text.clone(),
            ..SuggestedEdit::new(&clause.clause_id, &finding.finding_id)
        })
    }
}

#[async_trait]
impl<E: EditDrafter> Worker for EditorWorker<E> {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn supported_tasks(&self) -> &[TaskType] {
        &[TaskType::EditorPass]
    }

    async fn process(&self, mut ctx: AnalysisContext) -> Result<AnalysisContext, WorkerError> {
        ctx.enter(Self::NAME);

        let mut batch = Vec::new();
        let mut failures = Vec::new();
        for styled in &ctx.styled_rationales {
            let Some(rationale) = ctx.rationale(&styled.rationale_id) else {
                tracing::debug!(rationale_id = %styled.rationale_id, "No neutral rationale, skipping");
                continue;
            };
            let Some(finding) = ctx.finding(&rationale.finding_id) else {
                tracing::debug!(finding_id = %rationale.finding_id, "No finding, skipping");
                continue;
            };
            let Some(clause) = ctx.clause(&finding.clause_id) else {
                tracing::debug!(clause_id = %finding.clause_id, "No clause, skipping");
                continue;
            };
            match self.draft(clause, finding, rationale, styled).await {
                Ok(edit) => batch.push(edit),
                Err(e) => failures.push((styled.rationale_id.clone(), e)),
            }
        }

        let report = resolve_conflicts(self.strategy.as_ref(), &mut batch);
        let drafted = batch.len();
        ctx.suggested_edits.extend(batch);
        for (rationale_id, e) in failures {
            tracing::warn!(rationale_id = %rationale_id, error = %e, "Edit drafting failed");
            ctx.record_error(
                Self::NAME,
                e.kind(),
                format!("drafting edit for rationale {rationale_id}: {e}"),
            );
        }

        tracing::info!(
            version_id = %ctx.version_id,
            edits = drafted,
            conflicting = report.edits_with_conflicts,
            strategy = self.strategy.name(),
            "Editor pass finished"
        );
        ctx.advance_to(WorkflowStage::Complete);
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ChangeType, Provenance, ProposedChange, Severity, StyleParams};
    use crate::stages::EditDraft;
    use chrono::Utc;
    use redline_composition::{conflict_count, Deletion, SweepResolver};

    /// Deletes the char range encoded in the proposed text as "start..end"
    struct RangeDrafter;

    #[async_trait]
    impl EditDrafter for RangeDrafter {
        async fn draft(
            &self,
            clause: &Clause,
            rationale: &NeutralRationale,
            _styled: &StyledRationale,
        ) -> Result<EditDraft, WorkerError> {
            let (start, end) = rationale
                .proposed_change
                .proposed
                .split_once("..")
                .and_then(|(s, e)| Some((s.parse().ok()?, e.parse().ok()?)))
                .ok_or_else(|| WorkerError::InvalidOutput("no range".into()))?;
            let deleted: String = clause.text.chars().skip(start).take(end - start).collect();
            Ok(EditDraft {
                edit_type: "text_replacement".into(),
                deletions: vec![Deletion {
                    start,
                    end,
                    deleted_text: deleted,
                }],
                insertions: vec![],
                resulting_text: String::new(),
                change_summary: format!("delete {start}..{end}"),
            })
        }
    }

    fn chain(ctx: &mut AnalysisContext, n: usize, clause_id: &str, range: &str) {
        ctx.findings.push(Finding {
            finding_id: format!("f{n}"),
            version_id: "v1".into(),
            clause_id: clause_id.into(),
            policy_id: format!("p{n}"),
            deviation_type: "excessive_value".into(),
            severity: Severity::High,
            evidence_quote: String::new(),
            policy_requirement: "Cap at 2x".into(),
            explanation: String::new(),
            provenance: Provenance::default(),
            created_at: Utc::now(),
        });
        ctx.neutral_rationales.push(NeutralRationale {
            rationale_id: format!("r{n}"),
            finding_id: format!("f{n}"),
            neutral_explanation: String::new(),
            evidence_quote: String::new(),
            policy_reference: String::new(),
            proposed_change: ProposedChange {
                change_type: ChangeType::TextReplacement,
                current: None,
                proposed: range.into(),
                reasoning: "r".into(),
            },
            fallback_options: vec![],
            created_at: Utc::now(),
        });
        ctx.styled_rationales.push(StyledRationale {
            transformation_id: format!("t{n}"),
            rationale_id: format!("r{n}"),
            style: StyleParams::default(),
            text: format!("styled {n}"),
            created_at: Utc::now(),
        });
    }

    fn context() -> AnalysisContext {
        AnalysisContext::new(
            "v1",
            "s1",
            "",
            vec![
                Clause::new("c1", "Liability is capped at three times fees."),
                Clause::new("c2", "Payment is due within ninety days."),
            ],
            vec![],
            StyleParams::default(),
        )
    }

    #[tokio::test]
    async fn overlapping_edits_on_same_clause_are_marked() {
        let mut ctx = context();
        chain(&mut ctx, 1, "c1", "5..20");
        chain(&mut ctx, 2, "c1", "15..25");
        chain(&mut ctx, 3, "c2", "5..20");

        let out = EditorWorker::new(RangeDrafter)
            .with_strategy(SweepResolver)
            .process(ctx)
            .await
            .unwrap();

        assert_eq!(out.suggested_edits.len(), 3);
        assert_eq!(conflict_count(&out.suggested_edits), 2);
        let (a, b) = (&out.suggested_edits[0], &out.suggested_edits[1]);
        assert_eq!(a.conflicts_with, vec![b.edit_id.clone()]);
        assert_eq!(b.conflicts_with, vec![a.edit_id.clone()]);
        assert!(out.suggested_edits[2].conflicts_with.is_empty());

        let anchor = a.policy_anchor.as_ref().unwrap();
        assert_eq!(anchor.policy_id, "p1");
        assert_eq!(anchor.severity, "high");
        assert_eq!(a.explanation, "styled 1");
        assert_eq!(a.transformation_id, "t1");
        assert_eq!(out.stage, WorkflowStage::Complete);
    }

    #[tokio::test]
    async fn broken_links_are_skipped_and_draft_errors_recorded() {
        let mut ctx = context();
        chain(&mut ctx, 1, "c1", "0..4");
        chain(&mut ctx, 2, "missing-clause", "0..4");
        chain(&mut ctx, 3, "c2", "not a range");
        ctx.styled_rationales[0].rationale_id = "gone".into();

        let out = EditorWorker::new(RangeDrafter).process(ctx).await.unwrap();

        assert!(out.suggested_edits.is_empty());
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.errors[0].agent, "editor");
    }
}
