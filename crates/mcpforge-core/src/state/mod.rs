//! Workflow state model.
//!
//! [`GenerationState`] is the single record threaded through every stage
//! of a run. Only the orchestrator mutates it (the mutators are
//! crate-private), and every mutator enforces the run invariants:
//!
//! - `input_kind` is set once;
//! - `test_results`, `refinement_history` and `errors` are append-only;
//! - `current_iteration <= max_iterations`;
//! - `deployment_url` is present iff `deployment_stage != none`;
//! - `terminal_outcome` leaves `pending` exactly once.
//!
//! Stage changes follow the edge set in [`Stage::can_transition_to`]:
//!
//! ```text
//! start              -> classified
//! classified         -> generated
//! generated          -> staging_deployed
//! staging_deployed   -> tested
//! tested             -> refined | production_deployed
//! refined            -> staging_deployed
//! production_deployed-> persisted
//! persisted          -> done
//! <any non-terminal> -> failed
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::bundle::CodeBundle;
use crate::classify::ClassifiedInput;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Kind of input a run was started from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    /// A reference to an OpenAPI specification.
    Spec,
    /// A natural-language description of the server.
    Description,
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Spec => "spec",
            Self::Description => "description",
        })
    }
}

/// Target environment for a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployTarget {
    Staging,
    Production,
}

impl fmt::Display for DeployTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Staging => "staging",
            Self::Production => "production",
        })
    }
}

/// Where the current bundle is hosted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStage {
    #[default]
    None,
    Staging,
    Production,
}

impl From<DeployTarget> for DeploymentStage {
    fn from(target: DeployTarget) -> Self {
        match target {
            DeployTarget::Staging => Self::Staging,
            DeployTarget::Production => Self::Production,
        }
    }
}

impl fmt::Display for DeploymentStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Staging => "staging",
            Self::Production => "production",
        })
    }
}

/// Overall result of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalOutcome {
    #[default]
    Pending,
    Success,
    Failed,
}

impl fmt::Display for TerminalOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        })
    }
}

/// Orchestrator state-machine position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Start,
    Classified,
    Generated,
    StagingDeployed,
    Tested,
    Refined,
    ProductionDeployed,
    Persisted,
    Done,
    Failed,
}

impl Stage {
    /// Whether `self -> next` is an edge of the workflow graph.
    pub fn can_transition_to(self, next: Stage) -> bool {
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (_, Stage::Failed)
                | (Stage::Start, Stage::Classified)
                | (Stage::Classified, Stage::Generated)
                | (Stage::Generated, Stage::StagingDeployed)
                | (Stage::StagingDeployed, Stage::Tested)
                | (Stage::Tested, Stage::Refined)
                | (Stage::Tested, Stage::ProductionDeployed)
                | (Stage::Refined, Stage::StagingDeployed)
                | (Stage::ProductionDeployed, Stage::Persisted)
                | (Stage::Persisted, Stage::Done)
        )
    }

    /// `Done` and `Failed` accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Start => "start",
            Self::Classified => "classified",
            Self::Generated => "generated",
            Self::StagingDeployed => "staging_deployed",
            Self::Tested => "tested",
            Self::Refined => "refined",
            Self::ProductionDeployed => "production_deployed",
            Self::Persisted => "persisted",
            Self::Done => "done",
            Self::Failed => "failed",
        })
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One failed compliance check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckFailure {
    pub check_name: String,
    pub detail: String,
}

impl CheckFailure {
    pub fn new(check_name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            check_name: check_name.into(),
            detail: detail.into(),
        }
    }
}

impl fmt::Display for CheckFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.check_name, self.detail)
    }
}

/// Outcome of one test-harness invocation.
///
/// `passed` is derived from `failures` at construction and cannot drift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    passed: bool,
    failures: Vec<CheckFailure>,
}

impl TestResult {
    pub fn from_failures(failures: Vec<CheckFailure>) -> Self {
        Self {
            passed: failures.is_empty(),
            failures,
        }
    }

    pub fn passing() -> Self {
        Self::from_failures(Vec::new())
    }

    pub fn passed(&self) -> bool {
        self.passed
    }

    pub fn failures(&self) -> &[CheckFailure] {
        &self.failures
    }
}

/// One refinement attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefinementRecord {
    iteration: u32,
    input_failures: TestResult,
    diff_summary: String,
    /// sha256 of the refined bundle.
    bundle_digest: String,
}

impl RefinementRecord {
    pub fn new(
        iteration: u32,
        input_failures: TestResult,
        diff_summary: impl Into<String>,
        bundle_digest: impl Into<String>,
    ) -> Self {
        Self {
            iteration,
            input_failures,
            diff_summary: diff_summary.into(),
            bundle_digest: bundle_digest.into(),
        }
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn input_failures(&self) -> &TestResult {
        &self.input_failures
    }

    pub fn diff_summary(&self) -> &str {
        &self.diff_summary
    }

    pub fn bundle_digest(&self) -> &str {
        &self.bundle_digest
    }
}

/// Category of an error recorded during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorKind {
    Classification,
    Generation,
    Deployment { target: DeployTarget },
    Harness,
    Refinement,
    Persistence,
    IterationsExhausted,
    Cancelled,
    /// The orchestrator attempted an edge outside the workflow graph.
    InvalidTransition,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Classification => f.write_str("classification"),
            Self::Generation => f.write_str("generation"),
            Self::Deployment { target } => write!(f, "deployment ({target})"),
            Self::Harness => f.write_str("harness"),
            Self::Refinement => f.write_str("refinement"),
            Self::Persistence => f.write_str("persistence"),
            Self::IterationsExhausted => f.write_str("iterations_exhausted"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::InvalidTransition => f.write_str("invalid_transition"),
        }
    }
}

/// An error captured from any stage. Never removed once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub stage: Stage,
    #[serde(flatten)]
    pub kind: ErrorKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl ErrorRecord {
    pub fn new(stage: Stage, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            message: message.into(),
            at: Utc::now(),
        }
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.stage, self.kind, self.message)
    }
}

// ---------------------------------------------------------------------------
// State errors
// ---------------------------------------------------------------------------

/// Violation of a [`GenerationState`] invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("invalid stage transition: {from} -> {to}")]
    InvalidTransition { from: Stage, to: Stage },
    #[error("input already classified as {0}")]
    InputAlreadySet(InputKind),
    #[error("iteration budget exhausted ({max} of {max})")]
    IterationBudgetExhausted { max: u32 },
    #[error("run already finished with outcome {0}")]
    AlreadyFinished(TerminalOutcome),
    #[error("terminal outcome cannot be set back to pending")]
    PendingOutcome,
}

// ---------------------------------------------------------------------------
// GenerationState
// ---------------------------------------------------------------------------

/// The mutable record for a single workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationState {
    run_id: Uuid,
    input: Option<ClassifiedInput>,
    project_id: Option<String>,
    code_bundle: CodeBundle,
    deployment_stage: DeploymentStage,
    deployment_url: Option<String>,
    test_results: Vec<TestResult>,
    refinement_history: Vec<RefinementRecord>,
    current_iteration: u32,
    max_iterations: u32,
    errors: Vec<ErrorRecord>,
    persisted_id: Option<String>,
    terminal_outcome: TerminalOutcome,
    stage: Stage,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl GenerationState {
    /// Fresh state: iteration 0, nothing deployed, outcome pending.
    pub fn new(max_iterations: u32, project_id: Option<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            input: None,
            project_id,
            code_bundle: CodeBundle::default(),
            deployment_stage: DeploymentStage::None,
            deployment_url: None,
            test_results: Vec::new(),
            refinement_history: Vec::new(),
            current_iteration: 0,
            max_iterations,
            errors: Vec::new(),
            persisted_id: None,
            terminal_outcome: TerminalOutcome::Pending,
            stage: Stage::Start,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    // -- accessors ---------------------------------------------------------

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn input(&self) -> Option<&ClassifiedInput> {
        self.input.as_ref()
    }

    pub fn input_kind(&self) -> Option<InputKind> {
        self.input.as_ref().map(ClassifiedInput::kind)
    }

    pub fn input_payload(&self) -> Option<&str> {
        self.input.as_ref().map(ClassifiedInput::payload)
    }

    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    pub fn code_bundle(&self) -> &CodeBundle {
        &self.code_bundle
    }

    pub fn deployment_stage(&self) -> DeploymentStage {
        self.deployment_stage
    }

    pub fn deployment_url(&self) -> Option<&str> {
        self.deployment_url.as_deref()
    }

    pub fn test_results(&self) -> &[TestResult] {
        &self.test_results
    }

    pub fn refinement_history(&self) -> &[RefinementRecord] {
        &self.refinement_history
    }

    pub fn current_iteration(&self) -> u32 {
        self.current_iteration
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn errors(&self) -> &[ErrorRecord] {
        &self.errors
    }

    pub fn persisted_id(&self) -> Option<&str> {
        self.persisted_id.as_deref()
    }

    pub fn terminal_outcome(&self) -> TerminalOutcome {
        self.terminal_outcome
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// The most recent test result, if any.
    pub fn last_test_result(&self) -> Option<&TestResult> {
        self.test_results.last()
    }

    // -- mutators (orchestrator only) ---------------------------------------

    pub(crate) fn set_input(&mut self, input: ClassifiedInput) -> Result<(), StateError> {
        if let Some(existing) = &self.input {
            return Err(StateError::InputAlreadySet(existing.kind()));
        }
        self.input = Some(input);
        Ok(())
    }

    pub(crate) fn advance(&mut self, next: Stage) -> Result<(), StateError> {
        if !self.stage.can_transition_to(next) {
            return Err(StateError::InvalidTransition {
                from: self.stage,
                to: next,
            });
        }
        self.stage = next;
        Ok(())
    }

    pub(crate) fn set_bundle(&mut self, bundle: CodeBundle) {
        self.code_bundle = bundle;
    }

    /// Record a successful deploy. Called only after the deployer returned.
    pub(crate) fn record_deployment(&mut self, target: DeployTarget, url: String) {
        self.deployment_stage = target.into();
        self.deployment_url = Some(url);
    }

    pub(crate) fn push_test_result(&mut self, result: TestResult) {
        self.test_results.push(result);
    }

    /// Consume one unit of the iteration budget and return the new
    /// iteration number.
    pub(crate) fn begin_refinement(&mut self) -> Result<u32, StateError> {
        if self.current_iteration >= self.max_iterations {
            return Err(StateError::IterationBudgetExhausted {
                max: self.max_iterations,
            });
        }
        self.current_iteration += 1;
        Ok(self.current_iteration)
    }

    pub(crate) fn push_refinement(&mut self, record: RefinementRecord) {
        self.refinement_history.push(record);
    }

    pub(crate) fn push_error(&mut self, record: ErrorRecord) {
        self.errors.push(record);
    }

    pub(crate) fn set_persisted_id(&mut self, id: String) {
        self.persisted_id = Some(id);
    }

    /// Enter a terminal state. `Success` moves the stage to `Done` (which
    /// requires `Persisted`); `Failed` is reachable from any live stage.
    pub(crate) fn finish(&mut self, outcome: TerminalOutcome) -> Result<(), StateError> {
        if self.terminal_outcome != TerminalOutcome::Pending {
            return Err(StateError::AlreadyFinished(self.terminal_outcome));
        }
        let next = match outcome {
            TerminalOutcome::Pending => return Err(StateError::PendingOutcome),
            TerminalOutcome::Success => Stage::Done,
            TerminalOutcome::Failed => Stage::Failed,
        };
        self.advance(next)?;
        self.terminal_outcome = outcome;
        self.completed_at = Some(Utc::now());
        Ok(())
    }
}
