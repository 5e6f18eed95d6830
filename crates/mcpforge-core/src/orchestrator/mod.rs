//! Generation orchestrator: runs one request through
//! generate -> deploy -> test -> (refine -> redeploy)* -> promote -> persist.
//!
//! The orchestrator owns the run's [`GenerationState`] and is the only
//! code that mutates it. Adapters are shared immutable `Arc`s, so one
//! orchestrator can drive many concurrent runs.

pub mod config;
pub mod summary;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use chrono::Utc;
use tokio_util::sync::CancellationToken;

pub use config::{DEFAULT_MAX_ITERATIONS, OrchestratorConfig, StageTimeouts};
pub use summary::RunSummary;

use crate::classify::{self, ClassifiedInput, RawInput};
use crate::deployer::{self, Deployer};
use crate::error::{
    DeploymentError, GenerationError, HarnessError, PersistenceError, RefinementError,
};
use crate::generator::Generator;
use crate::harness::TestHarness;
use crate::persist::{self, PersistRequest, Persister};
use crate::refiner::Refiner;
use crate::state::{
    CheckFailure, DeployTarget, ErrorKind, ErrorRecord, GenerationState, RefinementRecord, Stage,
    StateError, TerminalOutcome, TestResult,
};

/// Check name of the synthetic failure recorded when the harness itself
/// could not run.
pub const HARNESS_CHECK: &str = "harness";

/// The external collaborators of a run.
#[derive(Clone)]
pub struct Adapters {
    pub generator: Arc<dyn Generator>,
    pub deployer: Arc<dyn Deployer>,
    pub harness: Arc<dyn TestHarness>,
    pub refiner: Arc<dyn Refiner>,
    /// `None` disables persistence; the `Persisted` stage is passed through.
    pub persister: Option<Arc<dyn Persister>>,
}

/// One workflow invocation.
#[derive(Debug, Clone, Default)]
pub struct WorkflowRequest {
    pub input: RawInput,
    pub project_id: Option<String>,
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    adapters: Adapters,
}

/// Why `drive` stopped early. Recorded against the stage reached.
#[derive(Debug)]
struct Abort {
    kind: ErrorKind,
    message: String,
}

impl Abort {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "run cancelled")
    }
}

impl From<StateError> for Abort {
    fn from(e: StateError) -> Self {
        Self::new(ErrorKind::InvalidTransition, e.to_string())
    }
}

/// Outcome of a guarded adapter call that did not succeed.
enum Interrupt<E> {
    Failed(E),
    Cancelled,
}

impl<E: fmt::Display> Interrupt<E> {
    fn into_abort(self, kind: ErrorKind) -> Abort {
        match self {
            Self::Failed(e) => Abort::new(kind, e.to_string()),
            Self::Cancelled => Abort::cancelled(),
        }
    }
}

/// Await `call` under `limit`, abandoning it if `cancel` fires first.
async fn guarded<T, E, F>(
    cancel: &CancellationToken,
    limit: Duration,
    call: F,
    on_timeout: impl FnOnce(Duration) -> E,
) -> Result<T, Interrupt<E>>
where
    F: Future<Output = Result<T, E>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Interrupt::Cancelled),
        outcome = tokio::time::timeout(limit, call) => match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(Interrupt::Failed(e)),
            Err(_) => Err(Interrupt::Failed(on_timeout(limit))),
        },
    }
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, adapters: Adapters) -> Result<Self> {
        if config.max_iterations == 0 {
            bail!("max_iterations must be a positive integer");
        }
        Ok(Self { config, adapters })
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run one request to a terminal outcome.
    ///
    /// Never returns an error: every failure is recorded in the returned
    /// state's `errors` and reflected in `terminal_outcome`.
    pub async fn run(&self, request: WorkflowRequest, cancel: CancellationToken) -> GenerationState {
        let WorkflowRequest { input, project_id } = request;
        let mut state = GenerationState::new(self.config.max_iterations, project_id);
        let run_id = state.run_id();
        tracing::info!(
            run_id = %run_id,
            max_iterations = self.config.max_iterations,
            "starting generation run"
        );

        let outcome = match self.drive(&mut state, &input, &cancel).await {
            Ok(()) => TerminalOutcome::Success,
            Err(abort) => {
                tracing::warn!(
                    run_id = %run_id,
                    stage = %state.stage(),
                    kind = %abort.kind,
                    error = %abort.message,
                    "generation run failed"
                );
                let stage = state.stage();
                state.push_error(ErrorRecord::new(stage, abort.kind, abort.message));
                TerminalOutcome::Failed
            }
        };

        if let Err(e) = state.finish(outcome) {
            tracing::error!(run_id = %run_id, error = %e, "could not finalize run state");
        }

        tracing::info!(
            run_id = %run_id,
            outcome = %state.terminal_outcome(),
            iterations = state.current_iteration(),
            test_runs = state.test_results().len(),
            errors = state.errors().len(),
            "generation run finished"
        );
        state
    }

    async fn drive(
        &self,
        state: &mut GenerationState,
        raw: &RawInput,
        cancel: &CancellationToken,
    ) -> Result<(), Abort> {
        let timeouts = &self.config.timeouts;

        // Start -> Classified
        let input = classify::classify(raw)
            .map_err(|e| Abort::new(ErrorKind::Classification, e.to_string()))?;
        state.set_input(input.clone())?;
        transition(state, Stage::Classified, cancel)?;

        // Classified -> Generated
        let bundle = guarded(
            cancel,
            timeouts.generate,
            self.adapters.generator.generate(&input),
            GenerationError::Timeout,
        )
        .await
        .map_err(|i| i.into_abort(ErrorKind::Generation))?;
        tracing::debug!(
            run_id = %state.run_id(),
            files = bundle.len(),
            digest = %bundle.digest(),
            "bundle generated"
        );
        state.set_bundle(bundle);
        transition(state, Stage::Generated, cancel)?;

        let app = deployer::app_name(state.started_at(), state.run_id());

        loop {
            // Generated | Refined -> StagingDeployed
            let url = self.deploy(state, &app, DeployTarget::Staging, cancel).await?;
            transition(state, Stage::StagingDeployed, cancel)?;

            // StagingDeployed -> Tested
            let result = self.test(state, &url, cancel).await?;
            state.push_test_result(result.clone());
            transition(state, Stage::Tested, cancel)?;

            if result.passed() {
                break;
            }

            if state.current_iteration() >= state.max_iterations() {
                return Err(Abort::new(
                    ErrorKind::IterationsExhausted,
                    format!(
                        "tests still failing after {} refinement iteration(s): {}",
                        state.current_iteration(),
                        failure_list(result.failures())
                    ),
                ));
            }

            // Tested -> Refined
            let iteration = state.begin_refinement()?;
            tracing::info!(
                run_id = %state.run_id(),
                iteration,
                failures = result.failures().len(),
                "refining bundle"
            );
            let refinement = guarded(
                cancel,
                timeouts.refine,
                self.adapters
                    .refiner
                    .refine(state.code_bundle(), result.failures()),
                RefinementError::Timeout,
            )
            .await
            .map_err(|i| i.into_abort(ErrorKind::Refinement))?;

            state.push_refinement(RefinementRecord::new(
                iteration,
                result,
                refinement.diff_summary,
                refinement.bundle.digest(),
            ));
            state.set_bundle(refinement.bundle);
            transition(state, Stage::Refined, cancel)?;
        }

        // Tested -> ProductionDeployed
        self.deploy(state, &app, DeployTarget::Production, cancel)
            .await?;
        transition(state, Stage::ProductionDeployed, cancel)?;

        // ProductionDeployed -> Persisted. Cancellation is no longer
        // honoured: the server is live and the run completes.
        self.persist(state, &input).await;
        state.advance(Stage::Persisted)?;
        Ok(())
    }

    /// Deploy the current bundle; `deployment_stage` advances only on success.
    async fn deploy(
        &self,
        state: &mut GenerationState,
        app: &str,
        target: DeployTarget,
        cancel: &CancellationToken,
    ) -> Result<String, Abort> {
        let deployment = guarded(
            cancel,
            self.config.timeouts.deploy,
            self.adapters
                .deployer
                .deploy(app, state.code_bundle(), target),
            |limit| DeploymentError::timeout(target, limit),
        )
        .await
        .map_err(|i| i.into_abort(ErrorKind::Deployment { target }))?;

        tracing::info!(
            run_id = %state.run_id(),
            %target,
            url = %deployment.url,
            deployment_id = ?deployment.deployment_id,
            "deployed"
        );
        state.record_deployment(target, deployment.url.clone());
        Ok(deployment.url)
    }

    /// Run the harness. A harness error becomes a failing result.
    async fn test(
        &self,
        state: &mut GenerationState,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<TestResult, Abort> {
        let timeouts = &self.config.timeouts;
        let outcome = guarded(
            cancel,
            timeouts.test_guard(),
            self.adapters.harness.run_tests(url, timeouts.test),
            HarnessError::Timeout,
        )
        .await;

        match outcome {
            Ok(result) => {
                tracing::info!(
                    run_id = %state.run_id(),
                    url,
                    passed = result.passed(),
                    failures = result.failures().len(),
                    "tests finished"
                );
                Ok(result)
            }
            Err(Interrupt::Cancelled) => Err(Abort::cancelled()),
            Err(Interrupt::Failed(e)) => {
                tracing::warn!(
                    run_id = %state.run_id(),
                    url,
                    error = %e,
                    "harness could not test endpoint; treating as failing"
                );
                let message = e.to_string();
                let stage = state.stage();
                state.push_error(ErrorRecord::new(stage, ErrorKind::Harness, message.clone()));
                Ok(TestResult::from_failures(vec![CheckFailure::new(
                    HARNESS_CHECK,
                    message,
                )]))
            }
        }
    }

    /// Record the production deployment. Failures are logged and
    /// appended to `errors` but never abort the run.
    async fn persist(&self, state: &mut GenerationState, input: &ClassifiedInput) {
        let Some(persister) = self.adapters.persister.as_ref() else {
            tracing::debug!(run_id = %state.run_id(), "no persister configured");
            return;
        };

        let result = match (state.project_id(), state.deployment_url()) {
            (Some(project_id), Some(url)) => {
                let name = persist::server_name(input.kind(), Utc::now());
                let description = match input {
                    ClassifiedInput::Description { text } => text.clone(),
                    ClassifiedInput::Spec { url } => format!("Generated from OpenAPI spec {url}"),
                };
                let request = PersistRequest {
                    project_id,
                    name: &name,
                    url,
                    description: Some(&description),
                };
                let limit = self.config.timeouts.persist;
                match tokio::time::timeout(limit, persister.persist(&request)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(PersistenceError::Timeout(limit)),
                }
            }
            _ => Err(PersistenceError::MissingProjectId),
        };

        match result {
            Ok(id) => {
                tracing::info!(
                    run_id = %state.run_id(),
                    persister = persister.name(),
                    record_id = %id,
                    "deployment recorded"
                );
                state.set_persisted_id(id);
            }
            Err(e) => {
                tracing::warn!(
                    run_id = %state.run_id(),
                    persister = persister.name(),
                    error = %e,
                    "failed to record deployment"
                );
                let stage = state.stage();
                state.push_error(ErrorRecord::new(stage, ErrorKind::Persistence, e.to_string()));
            }
        }
    }
}

/// Advance to `next` unless the run has been cancelled.
fn transition(
    state: &mut GenerationState,
    next: Stage,
    cancel: &CancellationToken,
) -> Result<(), Abort> {
    if cancel.is_cancelled() {
        return Err(Abort::cancelled());
    }
    let from = state.stage();
    state.advance(next)?;
    tracing::info!(run_id = %state.run_id(), from = %from, to = %next, "stage transition");
    Ok(())
}

fn failure_list(failures: &[CheckFailure]) -> String {
    failures
        .iter()
        .map(|f| f.check_name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
