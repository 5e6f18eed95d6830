//! Display projection of a finished run.

use std::fmt;

use serde::Serialize;
use uuid::Uuid;

use crate::state::{DeploymentStage, GenerationState, InputKind, TerminalOutcome};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub outcome: TerminalOutcome,
    pub input_kind: Option<InputKind>,
    pub iterations: u32,
    pub max_iterations: u32,
    pub test_runs: usize,
    pub refinements: usize,
    pub deployment_stage: DeploymentStage,
    pub deployment_url: Option<String>,
    pub persisted_id: Option<String>,
    pub errors: Vec<String>,
    pub duration_ms: Option<i64>,
}

impl From<&GenerationState> for RunSummary {
    fn from(state: &GenerationState) -> Self {
        Self {
            run_id: state.run_id(),
            outcome: state.terminal_outcome(),
            input_kind: state.input_kind(),
            iterations: state.current_iteration(),
            max_iterations: state.max_iterations(),
            test_runs: state.test_results().len(),
            refinements: state.refinement_history().len(),
            deployment_stage: state.deployment_stage(),
            deployment_url: state.deployment_url().map(str::to_owned),
            persisted_id: state.persisted_id().map(str::to_owned),
            errors: state.errors().iter().map(ToString::to_string).collect(),
            duration_ms: state
                .completed_at()
                .map(|end| (end - state.started_at()).num_milliseconds()),
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run:         {}", self.run_id)?;
        writeln!(f, "Outcome:     {}", self.outcome)?;
        if let Some(kind) = self.input_kind {
            writeln!(f, "Input:       {kind}")?;
        }
        writeln!(
            f,
            "Iterations:  {}/{} ({} test runs, {} refinements)",
            self.iterations, self.max_iterations, self.test_runs, self.refinements
        )?;
        match &self.deployment_url {
            Some(url) => writeln!(f, "Deployment:  {} {url}", self.deployment_stage)?,
            None => writeln!(f, "Deployment:  none")?,
        }
        if let Some(id) = &self.persisted_id {
            writeln!(f, "Record:      {id}")?;
        }
        if let Some(ms) = self.duration_ms {
            writeln!(f, "Duration:    {:.1}s", ms as f64 / 1000.0)?;
        }
        if !self.errors.is_empty() {
            writeln!(f, "Errors:")?;
            for error in &self.errors {
                writeln!(f, "  - {error}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_of_fresh_state() {
        let state = GenerationState::new(3, None);
        let summary = RunSummary::from(&state);
        assert_eq!(summary.outcome, TerminalOutcome::Pending);
        assert_eq!(summary.iterations, 0);
        assert!(summary.duration_ms.is_none());

        let text = summary.to_string();
        assert!(text.contains("Outcome:     pending"));
        assert!(text.contains("Deployment:  none"));
        assert!(!text.contains("Errors:"));
    }
}
