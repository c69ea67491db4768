//! End-to-end runs of the control loop over scripted capabilities

use pretty_assertions::assert_eq;
use redline_composition::{apply_edit, conflict_count};
use redline_core::{
    Orchestrator, Policy, ProjectMemory, RedlineConfig, Severity, WorkerRegistry,
};
use redline_kernel::{StageStatus, TaskOutcome, TaskType, WorkflowStage};
use redline_test_utils::{
    default_orchestrator, recording_registry, sample_policies, sample_request,
    single_clause_request, FailingWorker, Pipeline, RecordingWorker, ScriptedChecker,
    StaticIndex, TaskLog, TemplateGenerator, LIABILITY_CLAUSE,
};
use std::sync::Arc;
use std::time::Duration;

fn completed_task_types(orchestrator: &Orchestrator, project: &str) -> Vec<String> {
    orchestrator
        .memory()
        .agent_events(project)
        .unwrap()
        .into_iter()
        .filter(|e| e.action == "completed")
        .map(|e| e.payload["task_type"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn one_clause_runs_four_stages_in_order() {
    let orchestrator = default_orchestrator();
    let id = orchestrator
        .ingest(single_clause_request("acme", "v1"))
        .unwrap();

    let report = orchestrator.run(25).await;

    assert_eq!(report.iterations, 4);
    assert_eq!(report.executed, 4);
    assert!(report.exhausted);
    assert_eq!(
        completed_task_types(&orchestrator, "acme"),
        ["clause_review", "neutral_rationale", "style_pass", "editor_pass"]
    );

    let result = orchestrator.build_result(&id).unwrap();
    assert_eq!(result.stage, WorkflowStage::Complete);
    assert_eq!(result.summary.total_findings, 1);
    assert_eq!(result.summary.high_count, 1);
    assert_eq!(result.summary.total_rationales, 1);
    assert_eq!(result.styled_rationales.len(), 1);
    assert_eq!(result.summary.total_edits, 1);
    assert!(!result.summary.has_errors);

    let edit = &result.suggested_edits[0];
    assert_eq!(
        edit.resulting_text,
        "Supplier's total liability under this Agreement is capped at two times (2x) the annual fees."
    );
    assert_eq!(apply_edit(LIABILITY_CLAUSE, edit).unwrap(), edit.resulting_text);
    assert!(edit.explanation.starts_with("[concise|internal] "));
    assert_eq!(
        edit.policy_anchor.as_ref().map(|a| a.policy_id.as_str()),
        Some("pol-liability-cap")
    );
}

#[tokio::test]
async fn recording_workers_see_stage_order() {
    let log = TaskLog::default();
    let orchestrator = Orchestrator::in_memory(recording_registry(&log));
    orchestrator
        .ingest(single_clause_request("acme", "v1"))
        .unwrap();
    orchestrator.run(25).await;

    let order: Vec<TaskType> = log.lock().iter().map(|(_, t)| *t).collect();
    assert_eq!(order, TaskType::ALL.to_vec());
    assert_eq!(
        orchestrator.outcomes_for(TaskType::EditorPass),
        vec![TaskOutcome::succeeded(
            StageStatus::Terminal,
            Some("editor_pass handled editor_pass".into())
        )]
    );
}

#[tokio::test]
async fn overlapping_drafts_on_one_clause_are_marked() {
    let mut policies = sample_policies();
    policies.push(Policy::new(
        "pol-liability-scope",
        "liability",
        "Liability applies per claim.",
    ));
    let checker = ScriptedChecker::new()
        .flag("pol-liability-cap", Severity::High, Some("capped at three times"))
        .flag("pol-liability-scope", Severity::Medium, Some("three times (3x) the annual"));
    let generator = TemplateGenerator::new()
        .with_replacement("pol-liability-cap", "capped at two times")
        .with_replacement("pol-liability-scope", "two times (2x) per claim");
    let orchestrator = Pipeline::default()
        .with_checker(checker)
        .with_generator(generator)
        .orchestrator(RedlineConfig::default(), ProjectMemory::in_memory());

    let id = orchestrator
        .ingest(sample_request("acme", "v1").with_policies(policies))
        .unwrap();
    orchestrator.run(25).await;

    let result = orchestrator.build_result(&id).unwrap();
    assert_eq!(result.suggested_edits.len(), 2);
    assert_eq!(conflict_count(&result.suggested_edits), 2);
    assert_eq!(result.summary.edits_with_conflicts, 2);
    let (a, b) = (&result.suggested_edits[0], &result.suggested_edits[1]);
    assert_eq!(a.conflicts_with, vec![b.edit_id.clone()]);
    assert_eq!(b.conflicts_with, vec![a.edit_id.clone()]);
}

#[tokio::test]
async fn edits_on_different_clauses_do_not_conflict() {
    let orchestrator = default_orchestrator();
    let id = orchestrator.ingest(sample_request("acme", "v1")).unwrap();
    orchestrator.run(25).await;

    let result = orchestrator.build_result(&id).unwrap();
    assert_eq!(result.summary.total_findings, 2);
    assert_eq!(result.summary.total_edits, 2);
    assert_eq!(result.summary.edits_with_conflicts, 0);
    assert_eq!(result.summary.by_severity.get("medium"), Some(&1));
}

#[tokio::test]
async fn worker_error_is_isolated_to_its_task() {
    let log = TaskLog::default();
    let registry = WorkerRegistry::new()
        .with(RecordingWorker::new("reviewer", TaskType::ClauseReview, Arc::clone(&log)))
        .and_then(|r| {
            r.with(RecordingWorker::new(
                "rationale",
                TaskType::NeutralRationale,
                Arc::clone(&log),
            ))
        })
        .and_then(|r| r.with(FailingWorker::new("stylist", TaskType::StylePass, "model overloaded")))
        .and_then(|r| r.with(RecordingWorker::new("editor", TaskType::EditorPass, Arc::clone(&log))))
        .unwrap();
    let orchestrator = Orchestrator::in_memory(registry);
    let first = orchestrator.ingest(single_clause_request("acme", "v1")).unwrap();
    let second = orchestrator.ingest(single_clause_request("acme", "v2")).unwrap();

    let report = orchestrator.run(25).await;

    assert_eq!(report.executed, 4);
    assert_eq!(report.failed, 2);
    assert!(report.exhausted);
    assert!(orchestrator.outcomes_for(TaskType::EditorPass).is_empty());
    for outcome in orchestrator.outcomes_for(TaskType::StylePass) {
        assert_eq!(outcome, TaskOutcome::failed("model overloaded"));
    }

    for id in [&first, &second] {
        let ctx = orchestrator.context(id).unwrap();
        assert_eq!(ctx.errors.len(), 1);
        assert_eq!(ctx.errors[0].agent, "stylist");
        assert_eq!(ctx.errors[0].error_type, "internal");
        assert_eq!(ctx.stage, WorkflowStage::Styling);
    }
    let errors: Vec<_> = orchestrator
        .memory()
        .agent_events("acme")
        .unwrap()
        .into_iter()
        .filter(|e| e.action == "error")
        .collect();
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0].payload["error"], "model overloaded");
}

#[tokio::test]
async fn missing_worker_truncates_pipeline() {
    let log = TaskLog::default();
    let registry = WorkerRegistry::new()
        .with(RecordingWorker::new("reviewer", TaskType::ClauseReview, Arc::clone(&log)))
        .unwrap();
    let orchestrator = Orchestrator::in_memory(registry);
    orchestrator.ingest(single_clause_request("acme", "v1")).unwrap();

    let report = orchestrator.run(25).await;

    assert_eq!(report.iterations, 2);
    assert_eq!(report.failed, 1);
    assert!(report.exhausted);
    assert_eq!(
        orchestrator.outcomes_for(TaskType::NeutralRationale),
        vec![TaskOutcome::NoCapableWorker]
    );
    assert!(orchestrator.outcomes_for(TaskType::StylePass).is_empty());
    assert_eq!(orchestrator.pending_tasks(), 0);
    let actions: Vec<_> = orchestrator
        .memory()
        .agent_events("acme")
        .unwrap()
        .into_iter()
        .map(|e| e.action)
        .collect();
    assert_eq!(actions, ["ingest_version", "completed", "no_worker"]);
}

#[tokio::test]
async fn missing_context_ends_task() {
    let orchestrator = default_orchestrator();
    let id = orchestrator.ingest(single_clause_request("acme", "v1")).unwrap();
    orchestrator.memory().discard_context(&id);

    let report = orchestrator.run(25).await;

    assert_eq!(report.iterations, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(
        orchestrator.outcomes_for(TaskType::ClauseReview),
        vec![TaskOutcome::MissingContext]
    );
    assert!(orchestrator.build_result(&id).is_none());
}

#[tokio::test]
async fn review_fan_out_respects_concurrency_limit() {
    let policies: Vec<Policy> = (0..12)
        .map(|i| Policy::new(format!("pol-{i}"), "liability", "Cap at 2x."))
        .collect();
    let checker = ScriptedChecker::new()
        .flag("pol-3", Severity::Low, Some("three times"))
        .fail_on("pol-7")
        .with_delay(Duration::from_millis(10));
    let mut config = RedlineConfig::new().with_review_concurrency(3);
    config.max_policies_per_clause = 12;
    let pipeline = Pipeline::default().with_checker(checker);
    let orchestrator = pipeline.orchestrator(config, ProjectMemory::in_memory());

    let id = orchestrator
        .ingest(single_clause_request("acme", "v1").with_policies(policies))
        .unwrap();
    orchestrator.run(1).await;

    assert_eq!(pipeline.checker.calls().len(), 12);
    assert!(pipeline.checker.peak() <= 3);
    let ctx = orchestrator.context(&id).unwrap();
    assert_eq!(ctx.findings.len(), 1);
    assert_eq!(ctx.errors.len(), 1);
    assert_eq!(ctx.errors[0].error_type, "capability");
    assert_eq!(ctx.stage, WorkflowStage::Rationalizing);
}

#[tokio::test]
async fn untyped_clause_uses_similarity_index() {
    let checker = ScriptedChecker::new().flag("pol-confidentiality", Severity::Critical, None);
    let index = StaticIndex(vec![sample_policies().swap_remove(2)]);
    let orchestrator = Pipeline::default()
        .with_checker(checker)
        .with_index(index)
        .orchestrator(RedlineConfig::default(), ProjectMemory::in_memory());

    let id = orchestrator.ingest(sample_request("acme", "v1")).unwrap();
    orchestrator.run(25).await;

    let result = orchestrator.build_result(&id).unwrap();
    assert_eq!(result.findings.len(), 1);
    let finding = &result.findings[0];
    assert_eq!(finding.clause_id, "c-confidentiality");
    assert_eq!(finding.severity, Severity::Critical);
    // anchored to the clause text when the checker gave no quote
    assert_eq!(
        finding.evidence_quote,
        "Each party shall keep the other party's information confidential."
    );
    assert_eq!(result.summary.critical_count, 1);
}

#[tokio::test]
async fn non_neutral_rationale_is_rejected() {
    let pipeline = Pipeline::default()
        .with_generator(TemplateGenerator::sample().loud_for("pol-payment-terms"));
    let orchestrator = pipeline.orchestrator(RedlineConfig::default(), ProjectMemory::in_memory());

    let id = orchestrator.ingest(sample_request("acme", "v1")).unwrap();
    orchestrator.run(25).await;

    let result = orchestrator.build_result(&id).unwrap();
    assert_eq!(result.summary.total_findings, 2);
    assert_eq!(result.summary.total_rationales, 1);
    assert_eq!(result.summary.total_edits, 1);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].error_type, "validation");
    assert!(result.errors[0].message.contains("urgent"));
    assert_eq!(result.stage, WorkflowStage::Complete);
}

#[tokio::test]
async fn styled_rationales_hit_cache_on_rerun() {
    let pipeline = Pipeline::default();
    let config = RedlineConfig::default();
    let registry = pipeline.registry(&config);
    let style = registry.route(TaskType::StylePass).unwrap();

    let orchestrator = pipeline.orchestrator(config, ProjectMemory::in_memory());
    let id = orchestrator.ingest(sample_request("acme", "v1")).unwrap();
    orchestrator.run(2).await;
    let ctx = orchestrator.context(&id).unwrap();

    let first = style.process(ctx.clone()).await.unwrap();
    let calls = pipeline.stylist.calls();
    let second = style.process(ctx).await.unwrap();

    assert_eq!(pipeline.stylist.calls(), calls);
    assert_eq!(
        first.styled_rationales[0].transformation_id,
        second.styled_rationales[0].transformation_id
    );
}
