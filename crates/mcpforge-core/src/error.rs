//! Adapter-boundary error taxonomy.
//!
//! Every stage adapter reports failure through one of these enums. Each
//! carries a `Timeout` variant so a call that exceeds its stage budget is
//! reported as that stage's own error.

use std::time::Duration;

use thiserror::Error;

use crate::state::DeployTarget;

/// Raw input could not be mapped to an input kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassificationError {
    #[error("no usable input: provide an OpenAPI spec URL or a description")]
    Empty,
    #[error("OpenAPI spec reference must be an http(s) URL, got {0:?}")]
    InvalidSpecReference(String),
}

/// Code generation failed. No partial bundle is ever returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("generation backend failed: {0}")]
    Backend(String),
    #[error("generator produced no files")]
    EmptyBundle,
    #[error("generator returned a malformed bundle: {0}")]
    MalformedBundle(String),
    #[error("generated bundle has no entry point (expected one of {expected})")]
    MissingEntryPoint { expected: String },
    #[error("{generator} generator cannot handle {input} input")]
    UnsupportedInput {
        generator: &'static str,
        input: String,
    },
    #[error("generation timed out after {0:?}")]
    Timeout(Duration),
}

/// Why a deployment did not produce a reachable endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeployFailure {
    #[error("platform rejected the deployment (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("build failed: {0}")]
    BuildFailed(String),
    #[error("malformed platform response: {0}")]
    MalformedResponse(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// A deployment to `target` failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{target} deployment failed: {cause}")]
pub struct DeploymentError {
    pub target: DeployTarget,
    #[source]
    pub cause: DeployFailure,
}

impl DeploymentError {
    pub fn new(target: DeployTarget, cause: DeployFailure) -> Self {
        Self { target, cause }
    }

    pub fn timeout(target: DeployTarget, limit: Duration) -> Self {
        Self::new(target, DeployFailure::Timeout(limit))
    }
}

/// The test harness itself could not run. Protocol non-compliance is
/// never reported through this type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HarnessError {
    #[error("invalid endpoint URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("endpoint {url} is unreachable: {cause}")]
    Unreachable { url: String, cause: String },
    #[error("test run timed out after {0:?}")]
    Timeout(Duration),
}

/// The refiner could not produce a changed bundle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefinementError {
    #[error("refinement backend failed: {0}")]
    Backend(String),
    #[error("refiner proposed no file changes")]
    EmptyProposal,
    #[error("refiner proposed changes to unknown file {0:?}")]
    UnknownFile(String),
    #[error("refiner proposal leaves the bundle unchanged")]
    NoChange,
    #[error("refinement timed out after {0:?}")]
    Timeout(Duration),
}

/// Recording the production deployment failed. Never fatal to a run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistenceError {
    #[error("persistence is enabled but no project id was supplied")]
    MissingProjectId,
    #[error("persistence backend failed: {0}")]
    Backend(String),
    #[error("persistence timed out after {0:?}")]
    Timeout(Duration),
}
