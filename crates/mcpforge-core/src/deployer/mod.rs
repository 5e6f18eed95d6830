//! Deployment adapters.

pub mod http;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use http::{HttpDeployer, HttpDeployerConfig};

use crate::bundle::CodeBundle;
use crate::error::DeploymentError;
pub use crate::state::DeployTarget;

/// A reachable deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub url: String,
    pub deployment_id: Option<String>,
}

/// Pushes a bundle to a hosting platform.
///
/// Redeploying the same `app` is allowed and may return a different URL.
#[async_trait]
pub trait Deployer: Send + Sync {
    fn name(&self) -> &str;

    async fn deploy(
        &self,
        app: &str,
        bundle: &CodeBundle,
        target: DeployTarget,
    ) -> Result<Deployment, DeploymentError>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn Deployer) {}
};

/// Application name shared by every deploy of one run:
/// `mcp-server-<YYYYmmdd-HHMMSS>-<run id prefix>`.
pub fn app_name(started_at: DateTime<Utc>, run_id: Uuid) -> String {
    let simple = run_id.simple().to_string();
    format!(
        "mcp-server-{}-{}",
        started_at.format("%Y%m%d-%H%M%S"),
        &simple[..8]
    )
}
