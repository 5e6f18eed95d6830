use std::time::Duration;

/// Default refinement budget.
pub const DEFAULT_MAX_ITERATIONS: u32 = 3;

/// Wall-clock budget for each adapter call, by stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageTimeouts {
    pub generate: Duration,
    pub deploy: Duration,
    /// Budget handed to the harness for one test run.
    pub test: Duration,
    pub refine: Duration,
    pub persist: Duration,
}

impl StageTimeouts {
    /// Hard limit on a test run: the harness budget plus a quarter of it,
    /// so a harness that honours its budget always reports its own failures.
    pub fn test_guard(&self) -> Duration {
        self.test + self.test / 4
    }
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            generate: Duration::from_secs(300),
            deploy: Duration::from_secs(300),
            test: Duration::from_secs(120),
            refine: Duration::from_secs(300),
            persist: Duration::from_secs(30),
        }
    }
}

/// Configuration for the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Maximum refinement loops per run. Must be positive.
    pub max_iterations: u32,
    pub timeouts: StageTimeouts,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            timeouts: StageTimeouts::default(),
        }
    }
}
