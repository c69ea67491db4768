//! Testing utilities for the Redline workspace
//!
//! Fixtures, deterministic stand-ins for the reasoning capabilities, and
//! helpers that wire them into an orchestrator.

#![allow(missing_docs)]

use async_trait::async_trait;
use parking_lot::Mutex;
use redline_composition::{Deletion, Insertion};
use redline_core::stages::{
    Deviation, EditDraft, EditDrafter, PolicyChecker, PolicyIndex, RationaleDraft,
    RationaleGenerator, Stylist,
};
use redline_core::{
    AnalysisContext, ChangeType, Clause, EditorWorker, Finding, IngestRequest, NeutralRationale,
    Orchestrator, Policy, ProjectMemory, ProposedChange, RationaleWorker, RedlineConfig,
    ReviewWorker, Severity, StyleParams, StyleWorker, StyledRationale, Worker, WorkerError,
    WorkerRegistry,
};
use redline_kernel::TaskType;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ----------------------------------------------------------------------
// Fixtures
// ----------------------------------------------------------------------

pub const LIABILITY_CLAUSE: &str =
    "Supplier's total liability under this Agreement is capped at three times (3x) the annual fees.";
pub const PAYMENT_CLAUSE: &str = "Customer shall pay all invoices within ninety (90) days of receipt.";
pub const CONFIDENTIALITY_CLAUSE: &str =
    "Each party shall keep the other party's information confidential.";

pub fn sample_contract() -> String {
    [LIABILITY_CLAUSE, PAYMENT_CLAUSE, CONFIDENTIALITY_CLAUSE].join("\n")
}

fn clause_at(id: &str, identifier: &str, text: &str, start: usize) -> Clause {
    let mut clause = Clause::new(id, text);
    clause.identifier = identifier.to_string();
    clause.char_start = start;
    clause.char_end = start + text.chars().count();
    clause
}

/// Liability and payment clauses are typed; confidentiality is not
pub fn sample_clauses() -> Vec<Clause> {
    let liability_len = LIABILITY_CLAUSE.chars().count() + 1;
    let payment_len = PAYMENT_CLAUSE.chars().count() + 1;
    vec![
        clause_at("c-liability", "8.1", LIABILITY_CLAUSE, 0).with_type("liability"),
        clause_at("c-payment", "4.2", PAYMENT_CLAUSE, liability_len).with_type("payment"),
        clause_at(
            "c-confidentiality",
            "11.1",
            CONFIDENTIALITY_CLAUSE,
            liability_len + payment_len,
        ),
    ]
}

pub fn sample_policies() -> Vec<Policy> {
    vec![
        Policy::new(
            "pol-liability-cap",
            "liability",
            "Liability caps may not exceed two times (2x) annual fees.",
        ),
        Policy::new("pol-payment-terms", "payment", "Payment terms are net 30 days."),
        Policy::new(
            "pol-confidentiality",
            "confidentiality",
            "Confidentiality obligations survive termination for three years.",
        ),
    ]
}

pub fn sample_request(project_id: &str, version_id: &str) -> IngestRequest {
    IngestRequest::new(project_id, "session-1", version_id, sample_contract())
        .with_clauses(sample_clauses())
        .with_policies(sample_policies())
}

/// A context holding only the liability clause and its policy
pub fn single_clause_request(project_id: &str, version_id: &str) -> IngestRequest {
    let clauses = vec![sample_clauses().swap_remove(0)];
    let policies = vec![sample_policies().swap_remove(0)];
    IngestRequest::new(project_id, "session-1", version_id, LIABILITY_CLAUSE)
        .with_clauses(clauses)
        .with_policies(policies)
}

// ----------------------------------------------------------------------
// Scripted capabilities
// ----------------------------------------------------------------------

/// Flags configured policies, fails on others, tracks peak concurrency
#[derive(Debug, Default)]
pub struct ScriptedChecker {
    flagged: HashMap<String, (Severity, Option<String>)>,
    failing: HashSet<String>,
    delay: Option<Duration>,
    active: AtomicUsize,
    peak: AtomicUsize,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checker that flags the sample liability and payment policies
    pub fn sample() -> Self {
        Self::new()
            .flag("pol-liability-cap", Severity::High, Some("three times (3x)"))
            .flag("pol-payment-terms", Severity::Medium, Some("ninety (90) days"))
    }

    pub fn flag(mut self, policy_id: &str, severity: Severity, quote: Option<&str>) -> Self {
        self.flagged
            .insert(policy_id.to_string(), (severity, quote.map(str::to_string)));
        self
    }

    pub fn fail_on(mut self, policy_id: &str) -> Self {
        self.failing.insert(policy_id.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Highest number of checks observed in flight at once
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// `(clause_id, policy_id)` of every check, in call order
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl PolicyChecker for ScriptedChecker {
    async fn check(
        &self,
        clause: &Clause,
        policy: &Policy,
    ) -> Result<Option<Deviation>, WorkerError> {
        self.calls
            .lock()
            .push((clause.clause_id.clone(), policy.policy_id.clone()));
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(&policy.policy_id) {
            return Err(WorkerError::Capability(format!(
                "checker unavailable for {}",
                policy.policy_id
            )));
        }
        Ok(self
            .flagged
            .get(&policy.policy_id)
            .map(|(severity, quote)| Deviation {
                deviation_type: "excessive_value".to_string(),
                severity: *severity,
                evidence_quote: quote.clone(),
                explanation: format!("Clause differs from {}.", policy.policy_id),
            }))
    }
}

/// Similarity index returning a fixed list
#[derive(Debug, Default)]
pub struct StaticIndex(pub Vec<Policy>);

#[async_trait]
impl PolicyIndex for StaticIndex {
    async fn similar(&self, _text: &str, limit: usize) -> Result<Vec<Policy>, WorkerError> {
        Ok(self.0.iter().take(limit).cloned().collect())
    }
}

/// Builds neutral drafts from finding fields
#[derive(Debug, Default)]
pub struct TemplateGenerator {
    replacements: HashMap<String, String>,
    loud: HashSet<String>,
}

impl TemplateGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generator with replacement text for the sample policies
    pub fn sample() -> Self {
        Self::new()
            .with_replacement("pol-liability-cap", "two times (2x)")
            .with_replacement("pol-payment-terms", "thirty (30) days")
    }

    pub fn with_replacement(mut self, policy_id: &str, proposed: &str) -> Self {
        self.replacements
            .insert(policy_id.to_string(), proposed.to_string());
        self
    }

    /// Put non-neutral vocabulary in the summary for this policy
    pub fn loud_for(mut self, policy_id: &str) -> Self {
        self.loud.insert(policy_id.to_string());
        self
    }
}

#[async_trait]
impl RationaleGenerator for TemplateGenerator {
    async fn generate(
        &self,
        finding: &Finding,
        clause: Option<&Clause>,
    ) -> Result<RationaleDraft, WorkerError> {
        let evidence = if finding.evidence_quote.is_empty() {
            clause.map(|c| c.text.clone()).unwrap_or_default()
        } else {
            finding.evidence_quote.clone()
        };
        let mut summary = format!(
            "Clause {} deviates from policy {}.",
            finding.clause_id, finding.policy_id
        );
        if self.loud.contains(&finding.policy_id) {
            summary.push_str(" This is urgent.");
        }
        Ok(RationaleDraft {
            issue_summary: summary,
            evidence_quote: evidence.clone(),
            policy_reference: finding.policy_requirement.clone(),
            impact_explanation: format!("The {} differs from the policy value.", finding.deviation_type),
            proposed_change: ProposedChange {
                change_type: ChangeType::TextReplacement,
                current: Some(evidence),
                proposed: self
                    .replacements
                    .get(&finding.policy_id)
                    .cloned()
                    .unwrap_or_else(|| "conforming language".to_string()),
                reasoning: "Aligns the clause with the policy text.".to_string(),
            },
            fallback_options: Vec::new(),
        })
    }
}

/// Prefixes the neutral explanation with tone and audience
#[derive(Debug, Default)]
pub struct EchoStylist {
    calls: AtomicUsize,
}

impl EchoStylist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Stylist for EchoStylist {
    async fn restyle(
        &self,
        rationale: &NeutralRationale,
        style: &StyleParams,
        _finding: Option<&Finding>,
    ) -> Result<String, WorkerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!(
            "[{}|{}] {}",
            style.tone, style.audience, rationale.neutral_explanation
        ))
    }
}

/// Replaces the first occurrence of the current text with the proposed text
///
/// Appends the proposed text when the current text is absent.
#[derive(Debug, Default)]
pub struct ReplaceDrafter {
    failing: HashSet<String>,
}

impl ReplaceDrafter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(mut self, clause_id: &str) -> Self {
        self.failing.insert(clause_id.to_string());
        self
    }
}

#[async_trait]
impl EditDrafter for ReplaceDrafter {
    async fn draft(
        &self,
        clause: &Clause,
        rationale: &NeutralRationale,
        _styled: &StyledRationale,
    ) -> Result<EditDraft, WorkerError> {
        if self.failing.contains(&clause.clause_id) {
            return Err(WorkerError::InvalidOutput(format!(
                "no edit for {}",
                clause.clause_id
            )));
        }
        let change = &rationale.proposed_change;
        let current = change.current.as_deref().unwrap_or_default();
        let found = (!current.is_empty())
            .then(|| clause.text.find(current))
            .flatten();

        let (deletions, insertions, resulting_text) = match found {
            Some(byte_idx) => {
                let start = clause.text[..byte_idx].chars().count();
                let end = start + current.chars().count();
                let resulting = clause.text.replacen(current, &change.proposed, 1);
                (
                    vec![Deletion {
                        start,
                        end,
                        deleted_text: current.to_string(),
                    }],
                    vec![Insertion {
                        position: start,
                        inserted_text: change.proposed.clone(),
                    }],
                    resulting,
                )
            }
            None => (
                Vec::new(),
                vec![Insertion {
                    position: clause.text.chars().count(),
                    inserted_text: change.proposed.clone(),
                }],
                format!("{}{}", clause.text, change.proposed),
            ),
        };
        Ok(EditDraft {
            edit_type: "text_replacement".to_string(),
            deletions,
            insertions,
            resulting_text,
            change_summary: format!("{current} -> {}", change.proposed),
        })
    }
}

// ----------------------------------------------------------------------
// Workers
// ----------------------------------------------------------------------

/// Shared log of `(worker, task_type)` in execution order
pub type TaskLog = Arc<Mutex<Vec<(String, TaskType)>>>;

/// Records its invocations and advances the stage marker
#[derive(Debug)]
pub struct RecordingWorker {
    name: String,
    tasks: [TaskType; 1],
    log: TaskLog,
}

impl RecordingWorker {
    pub fn new(name: &str, task_type: TaskType, log: TaskLog) -> Self {
        Self {
            name: name.to_string(),
            tasks: [task_type],
            log,
        }
    }
}

#[async_trait]
impl Worker for RecordingWorker {
    fn name(&self) -> &str {
        &self.name
    }

    fn supported_tasks(&self) -> &[TaskType] {
        &self.tasks
    }

    async fn process(&self, mut ctx: AnalysisContext) -> Result<AnalysisContext, WorkerError> {
        ctx.enter(&self.name);
        self.log.lock().push((self.name.clone(), self.tasks[0]));
        ctx.advance_to(self.tasks[0].finished_stage());
        Ok(ctx)
    }
}

/// Always fails
#[derive(Debug)]
pub struct FailingWorker {
    name: String,
    tasks: [TaskType; 1],
    message: String,
}

impl FailingWorker {
    pub fn new(name: &str, task_type: TaskType, message: &str) -> Self {
        Self {
            name: name.to_string(),
            tasks: [task_type],
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl Worker for FailingWorker {
    fn name(&self) -> &str {
        &self.name
    }

    fn supported_tasks(&self) -> &[TaskType] {
        &self.tasks
    }

    async fn process(&self, _ctx: AnalysisContext) -> Result<AnalysisContext, WorkerError> {
        Err(WorkerError::Internal(self.message.clone()))
    }
}

/// One recording worker per task type, all sharing `log`
pub fn recording_registry(log: &TaskLog) -> WorkerRegistry {
    let mut registry = WorkerRegistry::new();
    for task_type in TaskType::ALL {
        registry
            .register(Arc::new(RecordingWorker::new(
                task_type.as_str(),
                task_type,
                Arc::clone(log),
            )))
            .expect("task types are disjoint");
    }
    registry
}

// ----------------------------------------------------------------------
// Pipeline wiring
// ----------------------------------------------------------------------

/// The four stage workers over scripted capabilities
///
/// Capabilities are shared so tests can inspect them after a run.
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub checker: Arc<ScriptedChecker>,
    pub generator: Arc<TemplateGenerator>,
    pub stylist: Arc<EchoStylist>,
    pub drafter: Arc<ReplaceDrafter>,
    pub index: Option<Arc<StaticIndex>>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self {
            checker: Arc::new(ScriptedChecker::sample()),
            generator: Arc::new(TemplateGenerator::sample()),
            stylist: Arc::new(EchoStylist::new()),
            drafter: Arc::new(ReplaceDrafter::new()),
            index: None,
        }
    }
}

impl Pipeline {
    pub fn with_checker(mut self, checker: ScriptedChecker) -> Self {
        self.checker = Arc::new(checker);
        self
    }

    pub fn with_generator(mut self, generator: TemplateGenerator) -> Self {
        self.generator = Arc::new(generator);
        self
    }

    pub fn with_drafter(mut self, drafter: ReplaceDrafter) -> Self {
        self.drafter = Arc::new(drafter);
        self
    }

    pub fn with_index(mut self, index: StaticIndex) -> Self {
        self.index = Some(Arc::new(index));
        self
    }

    pub fn registry(&self, config: &RedlineConfig) -> WorkerRegistry {
        let mut review = ReviewWorker::from_config(Arc::clone(&self.checker), config);
        if let Some(index) = &self.index {
            review = review.with_index(Arc::clone(index) as Arc<dyn PolicyIndex>);
        }
        WorkerRegistry::new()
            .with(review)
            .and_then(|r| r.with(RationaleWorker::new(Arc::clone(&self.generator))))
            .and_then(|r| r.with(StyleWorker::from_config(Arc::clone(&self.stylist), config)))
            .and_then(|r| r.with(EditorWorker::new(Arc::clone(&self.drafter))))
            .expect("stage workers have disjoint capabilities")
    }

    pub fn orchestrator(&self, config: RedlineConfig, memory: ProjectMemory) -> Orchestrator {
        let registry = self.registry(&config);
        Orchestrator::new(config, registry, memory)
    }
}

/// Default pipeline over volatile memory
pub fn default_orchestrator() -> Orchestrator {
    Pipeline::default().orchestrator(RedlineConfig::default(), ProjectMemory::in_memory())
}
