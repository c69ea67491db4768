//! Audience styling of neutral rationales

use super::{Stylist, TransformationCache};
use crate::config::RedlineConfig;
use crate::context::{AnalysisContext, NeutralRationale, StyledRationale};
use crate::error::WorkerError;
use crate::fanout::fan_out;
use crate::worker::Worker;
use async_trait::async_trait;
use chrono::Utc;
use redline_kernel::{TaskType, WorkflowStage};
use uuid::Uuid;

/// Restyles every neutral rationale for the session's audience
pub struct StyleWorker<S> {
    stylist: S,
    cache: Option<TransformationCache>,
    concurrency: usize,
}

impl<S: Stylist> StyleWorker<S> {
    /// Worker name
    pub const NAME: &'static str = "personality";

    /// Create without a cache
    #[must_use]
    pub fn new(stylist: S) -> Self {
        Self {
            stylist,
            cache: None,
            concurrency: RedlineConfig::default().style_concurrency,
        }
    }

    /// Create with concurrency and a cache sized from `config`
    #[must_use]
    pub fn from_config(stylist: S, config: &RedlineConfig) -> Self {
        Self::new(stylist)
            .with_concurrency(config.style_concurrency)
            .with_cache(TransformationCache::from_config(config))
    }

    /// With transformation cache
    #[inline]
    #[must_use]
    pub fn with_cache(mut self, cache: TransformationCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// With fan-out width
    #[inline]
    #[must_use]
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.concurrency = limit;
        self
    }

    /// Cache in use, if any
    #[inline]
    #[must_use]
    pub fn cache(&self) -> Option<&TransformationCache> {
        self.cache.as_ref()
    }

    /// Styled form of one rationale and whether it came from the cache
    async fn transform(
        &self,
        ctx: &AnalysisContext,
        rationale: &NeutralRationale,
    ) -> Result<(StyledRationale, bool), WorkerError> {
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(&rationale.rationale_id, &ctx.style).await {
                return Ok((hit, true));
            }
        }

        let finding = ctx.finding(&rationale.finding_id);
        let text = self.stylist.restyle(rationale, &ctx.style, finding).await?;
        let styled = StyledRationale {
            transformation_id: Uuid::new_v4().to_string(),
            rationale_id: rationale.rationale_id.clone(),
            style: ctx.style.clone(),
            text,
            created_at: Utc::now(),
        };
        if let Some(cache) = &self.cache {
            cache.insert(styled.clone()).await;
        }
        Ok((styled, false))
    }
}

#[async_trait]
impl<S: Stylist> Worker for StyleWorker<S> {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn supported_tasks(&self) -> &[TaskType] {
        &[TaskType::StylePass]
    }

    async fn process(&self, mut ctx: AnalysisContext) -> Result<AnalysisContext, WorkerError> {
        ctx.enter(Self::NAME);

        let view = &ctx;
        let out = fan_out(&ctx.neutral_rationales, self.concurrency, |rationale| async move {
            self.transform(view, rationale).await
        })
        .await;
        let ids: Vec<String> = ctx
            .neutral_rationales
            .iter()
            .map(|r| r.rationale_id.clone())
            .collect();

        let mut hits = 0usize;
        for (rationale_id, result) in ids.into_iter().zip(out.results) {
            match result {
                Ok((styled, cached)) => {
                    hits += usize::from(cached);
                    ctx.styled_rationales.push(styled);
                }
                Err(e) => {
                    tracing::warn!(rationale_id = %rationale_id, error = %e, "Styling failed");
                    ctx.record_error(
                        Self::NAME,
                        e.kind(),
                        format!("styling rationale {rationale_id}: {e}"),
                    );
                }
            }
        }

        tracing::info!(
            version_id = %ctx.version_id,
            styled = out.report.succeeded,
            failed = out.report.failed,
            cache_hits = hits,
            "Style pass finished"
        );
        ctx.advance_to(WorkflowStage::Editing);
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ChangeType, Finding, ProposedChange, StyleParams};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingStylist {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Stylist for CountingStylist {
        async fn restyle(
            &self,
            rationale: &NeutralRationale,
            style: &StyleParams,
            _finding: Option<&Finding>,
        ) -> Result<String, WorkerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if rationale.rationale_id == "bad" {
                return Err(WorkerError::InvalidOutput("empty completion".into()));
            }
            Ok(format!("[{}] {}", style.tone, rationale.neutral_explanation))
        }
    }

    fn rationale(id: &str) -> NeutralRationale {
        NeutralRationale {
            rationale_id: id.into(),
            finding_id: "f1".into(),
            neutral_explanation: format!("explanation {id}"),
            evidence_quote: String::new(),
            policy_reference: String::new(),
            proposed_change: ProposedChange {
                change_type: ChangeType::TextReplacement,
                current: None,
                proposed: "x".into(),
                reasoning: "y".into(),
            },
            fallback_options: vec![],
            created_at: Utc::now(),
        }
    }

    fn ctx(ids: &[&str]) -> AnalysisContext {
        let mut ctx = AnalysisContext::new("v1", "s1", "", vec![], vec![], StyleParams::default());
        ctx.neutral_rationales = ids.iter().map(|id| rationale(id)).collect();
        ctx
    }

    #[tokio::test]
    async fn styles_in_order_and_isolates_failures() {
        let worker = StyleWorker::new(CountingStylist::default()).with_concurrency(2);
        let out = worker.process(ctx(&["r1", "bad", "r2"])).await.unwrap();

        let texts: Vec<_> = out.styled_rationales.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, ["[concise] explanation r1", "[concise] explanation r2"]);
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.errors[0].error_type, "invalid_output");
        assert_eq!(out.stage, WorkflowStage::Editing);
    }

    #[tokio::test]
    async fn cache_short_circuits_repeat_work() {
        let cache = TransformationCache::new(64, Duration::from_secs(60));
        let worker = StyleWorker::new(CountingStylist::default()).with_cache(cache);

        let first = worker.process(ctx(&["r1", "r2"])).await.unwrap();
        let second = worker.process(ctx(&["r1", "r2"])).await.unwrap();

        assert_eq!(worker.stylist.calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            first.styled_rationales[0].transformation_id,
            second.styled_rationales[0].transformation_id
        );
    }
}
