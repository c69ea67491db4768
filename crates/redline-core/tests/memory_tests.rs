//! Version ingestion and project memory persistence

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use redline_core::{unified_diff, IngestRequest, ProjectMemory, RedlineConfig};
use redline_test_utils::{
    default_orchestrator, sample_request, single_clause_request, Pipeline, LIABILITY_CLAUSE,
};
use serde_json::json;

#[test]
fn same_text_twice_gives_equal_checksums_and_empty_diff() {
    let orchestrator = default_orchestrator();
    let first = orchestrator.ingest(sample_request("acme", "v1")).unwrap();
    let second = orchestrator.ingest(sample_request("acme", "v2")).unwrap();
    assert_ne!(first, second);
    assert_eq!(second.as_str(), "acme:v2");

    let history = orchestrator.memory().version_history("acme").unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].checksum, history[1].checksum);
    assert_eq!(history[0].checksum.len(), 64);
    assert_eq!(history[0].source, "upload");
    assert_eq!(history[0].diff_summary, None);
    assert_eq!(history[1].diff_summary.as_deref(), Some(""));
    assert_eq!(orchestrator.pending_tasks(), 2);
}

#[test]
fn changed_text_records_unified_diff() {
    let orchestrator = default_orchestrator();
    orchestrator
        .ingest(IngestRequest::new("acme", "s", "v1", "Term: 12 months\nFees: 100"))
        .unwrap();
    orchestrator
        .ingest(
            IngestRequest::new("acme", "s", "v2", "Term: 12 months\nFees: 200")
                .with_notes("fee update"),
        )
        .unwrap();

    let history = orchestrator.memory().version_history("acme").unwrap();
    let latest = &history[1];
    assert_eq!(latest.notes.as_deref(), Some("fee update"));
    assert_eq!(
        latest.diff_summary.as_deref(),
        Some("--- previous\n+++ current\n@@ -1,2 +1,2 @@\n Term: 12 months\n-Fees: 100\n+Fees: 200")
    );
    assert_ne!(history[0].checksum, latest.checksum);

    let events = orchestrator.memory().agent_events("acme").unwrap();
    assert_eq!(events[1].action, "ingest_version");
    assert_eq!(events[1].agent, "orchestrator");
    assert_eq!(events[1].payload["context_id"], "acme:v2");
    assert_eq!(events[1].payload["diff_summary"], json!(latest.diff_summary));
}

#[test]
fn ingest_records_session_preferences() {
    let orchestrator = default_orchestrator();
    orchestrator
        .ingest(
            sample_request("acme", "v1")
                .with_preference("liability_cap", json!("2x"))
                .with_preference("tone", json!("verbose")),
        )
        .unwrap();
    orchestrator
        .ingest(sample_request("acme", "v2").with_preference("tone", json!("concise")))
        .unwrap();

    let prefs = orchestrator.memory().preferences("acme", "session-1").unwrap();
    assert_eq!(prefs.len(), 2);
    assert_eq!(prefs["tone"].value, json!("concise"));
    assert_eq!(prefs["tone"].source, "session");
    assert_eq!(prefs["liability_cap"].value, json!("2x"));
    assert!(orchestrator
        .memory()
        .preferences("acme", "someone-else")
        .unwrap()
        .is_empty());
}

#[test]
fn projects_are_isolated() {
    let orchestrator = default_orchestrator();
    orchestrator.ingest(sample_request("acme", "v1")).unwrap();
    orchestrator.ingest(sample_request("globex", "v1")).unwrap();

    let history = orchestrator.memory().version_history("globex").unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].diff_summary, None);
    assert!(orchestrator.memory().version_history("initech").unwrap().is_empty());
}

#[tokio::test]
async fn file_backed_memory_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let memory = ProjectMemory::open(dir.path()).unwrap();
    let orchestrator = Pipeline::default().orchestrator(RedlineConfig::default(), memory);

    let id = orchestrator
        .ingest(single_clause_request("acme", "v1"))
        .unwrap();
    orchestrator.run(25).await;
    assert!(orchestrator.build_result(&id).is_some());
    drop(orchestrator);

    let reopened = ProjectMemory::open(dir.path()).unwrap();
    let history = reopened.version_history("acme").unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(
        reopened.latest_contract_text("acme").unwrap().as_deref(),
        Some(LIABILITY_CLAUSE)
    );

    let actions: Vec<String> = reopened
        .agent_events("acme")
        .unwrap()
        .into_iter()
        .map(|e| e.action)
        .collect();
    assert_eq!(
        actions,
        ["ingest_version", "completed", "completed", "completed", "completed"]
    );
    // live contexts are not persisted
    assert!(reopened.context(&id).is_none());
}

proptest! {
    #[test]
    fn identical_texts_never_diff(lines in prop::collection::vec("[a-z ]{0,12}", 0..20)) {
        let text = lines.join("\n");
        prop_assert_eq!(unified_diff(&text, &text, 3, 40), "");
    }

    #[test]
    fn diff_respects_line_cap(
        old in prop::collection::vec("[a-c]{1,3}", 1..30),
        new in prop::collection::vec("[a-c]{1,3}", 1..30),
        cap in 1usize..15,
    ) {
        let diff = unified_diff(&old.join("\n"), &new.join("\n"), 2, cap);
        prop_assert!(diff.lines().count() <= cap);
    }
}
