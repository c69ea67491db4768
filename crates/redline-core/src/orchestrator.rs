//! The control loop
//!
//! Owns the task queue, the worker registry and project memory. Ingestion
//! seeds one `clause_review` task per document version; [`Orchestrator::run`]
//! drains the queue, routing each task to its worker and enqueueing the
//! successor stage gated on the task just finished.
//!
//! Errors never stop the loop. Each one ends its own task with an error
//! outcome and is surfaced through agent events and the context error list.

use crate::config::RedlineConfig;
use crate::context::{
    AnalysisContext, Clause, ContextError, Finding, NeutralRationale, Policy, StyleParams,
    StyledRationale,
};
use crate::diff::{unified_diff, DEFAULT_CONTEXT};
use crate::error::CoreError;
use crate::memory::{ProjectMemory, VersionRecord};
use crate::worker::WorkerRegistry;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use redline_composition::{conflict_count, SuggestedEdit};
use redline_kernel::{
    ContextId, KernelError, StageStatus, Task, TaskId, TaskOutcome, TaskPayload, TaskQueue,
    TaskType, WorkflowStage,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::Instrument;

/// Agent name used for events the orchestrator itself records
pub const ORCHESTRATOR_AGENT: &str = "orchestrator";

/// A document version to analyse
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestRequest {
    /// Owning project
    pub project_id: String,
    /// Negotiation session; preferences are recorded under this user
    pub session_id: String,
    /// Version identifier, unique within the project
    pub version_id: String,
    /// Full document text
    pub contract_text: String,
    /// Pre-segmented clauses
    #[serde(default)]
    pub clauses: Vec<Clause>,
    /// Policies to review against
    #[serde(default)]
    pub policies: Vec<Policy>,
    /// Free-form version notes
    #[serde(default)]
    pub notes: Option<String>,
    /// Opaque snapshot of an external clause graph
    #[serde(default)]
    pub graph_snapshot: Option<String>,
    /// Session preferences
    #[serde(default)]
    pub preferences: BTreeMap<String, Value>,
    /// Output style
    #[serde(default)]
    pub style: StyleParams,
}

impl IngestRequest {
    /// Request with no clauses, policies or preferences
    pub fn new(
        project_id: impl Into<String>,
        session_id: impl Into<String>,
        version_id: impl Into<String>,
        contract_text: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            session_id: session_id.into(),
            version_id: version_id.into(),
            contract_text: contract_text.into(),
            clauses: Vec::new(),
            policies: Vec::new(),
            notes: None,
            graph_snapshot: None,
            preferences: BTreeMap::new(),
            style: StyleParams::default(),
        }
    }

    /// With clauses
    #[must_use]
    pub fn with_clauses(mut self, clauses: Vec<Clause>) -> Self {
        self.clauses = clauses;
        self
    }

    /// With policies
    #[must_use]
    pub fn with_policies(mut self, policies: Vec<Policy>) -> Self {
        self.policies = policies;
        self
    }

    /// With version notes
    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// With graph snapshot
    #[must_use]
    pub fn with_graph_snapshot(mut self, snapshot: impl Into<String>) -> Self {
        self.graph_snapshot = Some(snapshot.into());
        self
    }

    /// With one session preference
    #[must_use]
    pub fn with_preference(mut self, key: impl Into<String>, value: Value) -> Self {
        self.preferences.insert(key.into(), value);
        self
    }

    /// With style
    #[must_use]
    pub fn with_style(mut self, style: StyleParams) -> Self {
        self.style = style;
        self
    }
}

/// What one call to [`Orchestrator::run`] did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Tasks taken off the queue
    pub iterations: usize,
    /// Tasks whose worker succeeded
    pub executed: usize,
    /// Tasks that ended in an error outcome
    pub failed: usize,
    /// The loop stopped because nothing was runnable, not on the iteration bound
    pub exhausted: bool,
}

/// Derived counts over a finished context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    /// Findings
    pub total_findings: usize,
    /// Neutral rationales
    pub total_rationales: usize,
    /// Suggested edits
    pub total_edits: usize,
    /// Findings per severity tag
    pub by_severity: BTreeMap<String, usize>,
    /// Critical findings
    pub critical_count: usize,
    /// High findings
    pub high_count: usize,
    /// Edits with at least one conflict
    pub edits_with_conflicts: usize,
    /// Whether any error was recorded
    pub has_errors: bool,
    /// Style the rationales were written in
    pub style: StyleParams,
}

impl AnalysisSummary {
    /// Summarise `ctx`
    #[must_use]
    pub fn from_context(ctx: &AnalysisContext) -> Self {
        let mut by_severity = BTreeMap::new();
        for finding in &ctx.findings {
            *by_severity
                .entry(finding.severity.as_str().to_string())
                .or_insert(0) += 1;
        }
        let count = |tag: &str| by_severity.get(tag).copied().unwrap_or(0);
        Self {
            total_findings: ctx.findings.len(),
            total_rationales: ctx.neutral_rationales.len(),
            total_edits: ctx.suggested_edits.len(),
            critical_count: count("critical"),
            high_count: count("high"),
            by_severity,
            edits_with_conflicts: conflict_count(&ctx.suggested_edits),
            has_errors: !ctx.errors.is_empty(),
            style: ctx.style.clone(),
        }
    }
}

/// Read-back view of one analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Version analysed
    pub version_id: String,
    /// Session that ingested it
    pub session_id: String,
    /// Stage reached
    pub stage: WorkflowStage,
    /// Counts
    pub summary: AnalysisSummary,
    /// Findings
    pub findings: Vec<Finding>,
    /// Neutral rationales
    pub neutral_rationales: Vec<NeutralRationale>,
    /// Styled rationales
    pub styled_rationales: Vec<StyledRationale>,
    /// Suggested edits with conflict annotations
    pub suggested_edits: Vec<SuggestedEdit>,
    /// Accumulated errors
    pub errors: Vec<ContextError>,
    /// Context creation time
    pub started_at: DateTime<Utc>,
    /// Last context update
    pub completed_at: DateTime<Utc>,
    /// Last worker to hold the context
    pub current_worker: Option<String>,
}

impl From<AnalysisContext> for AnalysisResult {
    fn from(ctx: AnalysisContext) -> Self {
        let summary = AnalysisSummary::from_context(&ctx);
        Self {
            version_id: ctx.version_id,
            session_id: ctx.session_id,
            stage: ctx.stage,
            summary,
            findings: ctx.findings,
            neutral_rationales: ctx.neutral_rationales,
            styled_rationales: ctx.styled_rationales,
            suggested_edits: ctx.suggested_edits,
            errors: ctx.errors,
            started_at: ctx.started_at,
            completed_at: ctx.updated_at,
            current_worker: ctx.current_worker,
        }
    }
}

/// The adaptive controller
#[derive(Debug)]
pub struct Orchestrator {
    config: RedlineConfig,
    registry: WorkerRegistry,
    queue: Mutex<TaskQueue>,
    memory: ProjectMemory,
}

impl Orchestrator {
    /// Create an orchestrator owning `registry` and sharing `memory`
    #[must_use]
    pub fn new(config: RedlineConfig, registry: WorkerRegistry, memory: ProjectMemory) -> Self {
        let uncovered = registry.uncovered();
        if !uncovered.is_empty() {
            tracing::warn!(
                uncovered = ?uncovered,
                "No worker registered for some task types; those stages will end in no_worker"
            );
        }
        let queue = TaskQueue::with_max_dependency_polls(config.max_dependency_polls);
        Self {
            config,
            registry,
            queue: Mutex::new(queue),
            memory,
        }
    }

    /// Default configuration over volatile memory
    #[must_use]
    pub fn in_memory(registry: WorkerRegistry) -> Self {
        Self::new(RedlineConfig::default(), registry, ProjectMemory::in_memory())
    }

    /// Configuration in effect
    #[inline]
    #[must_use]
    pub fn config(&self) -> &RedlineConfig {
        &self.config
    }

    /// Registered workers
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    /// Project memory
    #[inline]
    #[must_use]
    pub fn memory(&self) -> &ProjectMemory {
        &self.memory
    }

    /// Register a document version and seed its review task
    ///
    /// # Errors
    /// [`CoreError::Memory`] if the version, a preference or the ingest event
    /// cannot be persisted.
    pub fn ingest(&self, request: IngestRequest) -> Result<ContextId, CoreError> {
        let IngestRequest {
            project_id,
            session_id,
            version_id,
            contract_text,
            clauses,
            policies,
            notes,
            graph_snapshot,
            preferences,
            style,
        } = request;

        let checksum = hex::encode(Sha256::digest(contract_text.as_bytes()));
        let diff_summary = self
            .memory
            .latest_contract_text(&project_id)?
            .filter(|previous| !previous.is_empty())
            .map(|previous| {
                unified_diff(
                    &previous,
                    &contract_text,
                    DEFAULT_CONTEXT,
                    self.config.diff_max_lines,
                )
            });

        let record = VersionRecord {
            version_id: version_id.clone(),
            source: "upload".to_string(),
            checksum,
            created_at: Utc::now(),
            notes,
            diff_summary: diff_summary.clone(),
            graph_snapshot,
        };
        self.memory
            .record_version(&project_id, record, Some(&contract_text))?;

        for (key, value) in preferences {
            self.memory
                .record_preference(&project_id, &session_id, &key, value, None, "session")?;
        }

        let context_id = ContextId::new(&project_id, &version_id);
        let context = AnalysisContext::new(
            &version_id,
            &session_id,
            contract_text,
            clauses,
            policies,
            style,
        );
        self.memory.store_context(context_id.clone(), context);

        let payload =
            TaskPayload::for_context(context_id.clone(), &project_id, &version_id, &session_id);
        let task_id = self.queue.lock().enqueue(
            TaskType::ClauseReview,
            payload,
            self.config.bootstrap_priority,
            None,
        );

        self.memory.log_event(
            &project_id,
            &version_id,
            ORCHESTRATOR_AGENT,
            "ingest_version",
            json!({
                "context_id": context_id.as_str(),
                "diff_summary": diff_summary,
            }),
        )?;

        tracing::info!(
            context_id = %context_id,
            task_id = %task_id,
            "Ingested contract version"
        );
        Ok(context_id)
    }

    /// Queue a stage for a live context outside the ingest chain
    ///
    /// `priority` falls back to the configured `default_priority`. The task
    /// chains into its successors like any other, so re-running
    /// `style_pass` after a style change also re-runs the editor.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownContext`] if no live context has `context_id`;
    /// [`CoreError::Kernel`] if the id does not end in the context's version.
    pub fn enqueue_task(
        &self,
        task_type: TaskType,
        context_id: &ContextId,
        priority: Option<u32>,
        depends_on: Option<TaskId>,
    ) -> Result<TaskId, CoreError> {
        let ctx = self
            .memory
            .context(context_id)
            .ok_or_else(|| CoreError::UnknownContext(context_id.clone()))?;
        let project_id = context_id
            .as_str()
            .strip_suffix(ctx.version_id.as_str())
            .and_then(|p| p.strip_suffix(':'))
            .filter(|p| !p.is_empty())
            .ok_or_else(|| KernelError::MalformedContextId(context_id.to_string()))?;

        let payload = TaskPayload::for_context(
            context_id.clone(),
            project_id,
            &ctx.version_id,
            &ctx.session_id,
        );
        let priority = priority.unwrap_or(self.config.default_priority);
        let task_id = self
            .queue
            .lock()
            .enqueue(task_type, payload, priority, depends_on);
        tracing::debug!(%task_id, %task_type, priority, "Task enqueued");
        Ok(task_id)
    }

    /// Process queued tasks until none is runnable or `max_iterations` is hit
    ///
    /// Stopping on the bound is not an error; calling again resumes with the
    /// same queue and completed ledger.
    pub async fn run(&self, max_iterations: usize) -> RunReport {
        let mut report = RunReport::default();
        while report.iterations < max_iterations {
            let Some(task) = self.next_task() else {
                report.exhausted = true;
                break;
            };
            report.iterations += 1;

            let outcome = self.execute(&task).await;
            if outcome.is_error() {
                report.failed += 1;
            } else {
                report.executed += 1;
            }
            self.queue.lock().mark_complete(task.id, outcome);
        }

        tracing::info!(
            iterations = report.iterations,
            executed = report.executed,
            failed = report.failed,
            exhausted = report.exhausted,
            "Run finished"
        );
        report
    }

    /// [`run`](Self::run) bounded by the configured `max_iterations`
    pub async fn run_default(&self) -> RunReport {
        self.run(self.config.max_iterations).await
    }

    fn next_task(&self) -> Option<Task> {
        self.queue.lock().dequeue()
    }

    async fn execute(&self, task: &Task) -> TaskOutcome {
        let span = tracing::info_span!(
            "task",
            task_id = %task.id,
            task_type = %task.task_type,
            context_id = %task.payload.context_id
        );
        self.dispatch(task).instrument(span).await
    }

    async fn dispatch(&self, task: &Task) -> TaskOutcome {
        let payload = &task.payload;
        let Some(worker) = self.registry.route(task.task_type) else {
            tracing::warn!("No capable worker");
            self.record_event(
                payload,
                ORCHESTRATOR_AGENT,
                "no_worker",
                json!({ "task_type": task.task_type.as_str() }),
            );
            return TaskOutcome::NoCapableWorker;
        };

        let Some(context) = self.memory.context(&payload.context_id) else {
            tracing::warn!("Context missing from store");
            return TaskOutcome::MissingContext;
        };

        match worker.process(context).await {
            Ok(updated) => {
                self.memory.store_context(payload.context_id.clone(), updated);
                let status = match task.task_type.successor() {
                    Some(next) => {
                        self.queue.lock().enqueue(
                            next,
                            payload.clone(),
                            task.priority.saturating_add(1),
                            Some(task.id),
                        );
                        StageStatus::Continued
                    }
                    None => StageStatus::Terminal,
                };
                let notes = format!("{} handled {}", worker.name(), task.task_type);
                self.record_event(
                    payload,
                    worker.name(),
                    "completed",
                    json!({
                        "task_type": task.task_type.as_str(),
                        "notes": notes,
                        "status": status,
                    }),
                );
                tracing::debug!(worker = worker.name(), ?status, "Task completed");
                TaskOutcome::succeeded(status, Some(notes))
            }
            Err(e) => {
                tracing::error!(worker = worker.name(), error = %e, "Worker failed");
                self.record_event(
                    payload,
                    worker.name(),
                    "error",
                    json!({
                        "task_type": task.task_type.as_str(),
                        "error": e.to_string(),
                    }),
                );
                self.memory.contexts().update(&payload.context_id, |ctx| {
                    ctx.record_error(worker.name(), e.kind(), e.to_string());
                });
                TaskOutcome::failed(&e)
            }
        }
    }

    fn record_event(&self, payload: &TaskPayload, agent: &str, action: &str, data: Value) {
        if let Err(e) =
            self.memory
                .log_event(&payload.project_id, &payload.version_id, agent, action, data)
        {
            tracing::warn!(action, error = %e, "Failed to record agent event");
        }
    }

    /// Snapshot of a live context
    #[must_use]
    pub fn context(&self, id: &ContextId) -> Option<AnalysisContext> {
        self.memory.context(id)
    }

    /// Findings, rationales, edits, errors and summary for a context
    #[must_use]
    pub fn build_result(&self, id: &ContextId) -> Option<AnalysisResult> {
        self.context(id).map(AnalysisResult::from)
    }

    /// Tasks waiting in the queue
    #[must_use]
    pub fn pending_tasks(&self) -> usize {
        self.queue.lock().pending_count()
    }

    /// Tasks in the completed ledger
    #[must_use]
    pub fn completed_tasks(&self) -> usize {
        self.queue.lock().completed().len()
    }

    /// Outcome of a finished task
    #[must_use]
    pub fn outcome(&self, task_id: TaskId) -> Option<TaskOutcome> {
        self.queue.lock().outcome(task_id).cloned()
    }

    /// Outcomes of every finished task of `task_type`
    #[must_use]
    pub fn outcomes_for(&self, task_type: TaskType) -> Vec<TaskOutcome> {
        self.queue
            .lock()
            .completed()
            .values()
            .filter(|c| c.task_type == task_type)
            .map(|c| c.outcome.clone())
            .collect()
    }
}
