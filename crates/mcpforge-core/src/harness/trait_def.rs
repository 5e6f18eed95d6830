//! The `TestHarness` trait -- compliance testing of a deployed endpoint.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::HarnessError;
use crate::state::TestResult;

/// Probes a deployed MCP endpoint and reports every failed check.
///
/// Protocol non-compliance is data: it is returned as failures inside
/// the [`TestResult`]. [`HarnessError`] is reserved for the harness being
/// unable to test at all (malformed URL, endpoint unreachable).
///
/// `budget` is the wall-clock time the caller allows for the whole run.
/// Checks that cannot finish inside it are reported as failures so the
/// result still names every check that did not pass.
///
/// # Object Safety
///
/// The orchestrator stores the harness as `Arc<dyn TestHarness>`.
#[async_trait]
pub trait TestHarness: Send + Sync {
    /// Human-readable name (e.g. "protocol").
    fn name(&self) -> &str;

    async fn run_tests(&self, url: &str, budget: Duration) -> Result<TestResult, HarnessError>;
}

// Compile-time assertion: TestHarness must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn TestHarness) {}
};
