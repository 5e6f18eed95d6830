//! Generic HTTP deployment platform client.
//!
//! Request: `POST {base_url}/v1/deployments`
//!
//! ```json
//! {"name": "...", "target": "staging", "files": {"index.js": "..."}}
//! ```
//!
//! Response (2xx): `{"id": "...", "url": "...", "status": "ready"}`. A
//! `mcp_url` field, when present, is preferred over `url`. A `status` of
//! `failed` or `build_failed` is reported as a build failure using the
//! `logs` (or `error`) field.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use super::{Deployer, Deployment};
use crate::bundle::CodeBundle;
use crate::error::{DeployFailure, DeploymentError};
use crate::state::DeployTarget;

#[derive(Debug, Clone)]
pub struct HttpDeployerConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub request_timeout: Duration,
}

impl HttpDeployerConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            request_timeout: Duration::from_secs(300),
        }
    }
}

pub struct HttpDeployer {
    config: HttpDeployerConfig,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct DeployResponse {
    id: Option<serde_json::Value>,
    url: Option<String>,
    mcp_url: Option<String>,
    status: Option<String>,
    logs: Option<String>,
    error: Option<String>,
}

impl HttpDeployer {
    pub fn new(config: HttpDeployerConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl Deployer for HttpDeployer {
    fn name(&self) -> &str {
        "http"
    }

    async fn deploy(
        &self,
        app: &str,
        bundle: &CodeBundle,
        target: DeployTarget,
    ) -> Result<Deployment, DeploymentError> {
        let fail = |cause| DeploymentError::new(target, cause);

        let url = format!(
            "{}/v1/deployments",
            self.config.base_url.trim_end_matches('/')
        );
        let body = serde_json::json!({
            "name": app,
            "target": target,
            "files": bundle,
        });
        debug!(%target, app, files = bundle.len(), url = %url, "submitting deployment");

        let mut request = self.client.post(&url).json(&body);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                fail(DeployFailure::Timeout(self.config.request_timeout))
            } else {
                fail(DeployFailure::Transport(e.to_string()))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(fail(DeployFailure::Rejected {
                status: status.as_u16(),
                body,
            }));
        }

        let parsed: DeployResponse = response
            .json()
            .await
            .map_err(|e| fail(DeployFailure::MalformedResponse(e.to_string())))?;

        if matches!(parsed.status.as_deref(), Some("failed" | "build_failed")) {
            let detail = parsed
                .logs
                .or(parsed.error)
                .unwrap_or_else(|| "no build output".to_owned());
            return Err(fail(DeployFailure::BuildFailed(detail)));
        }

        let endpoint = parsed
            .mcp_url
            .or(parsed.url)
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| fail(DeployFailure::MalformedResponse("response has no url".to_owned())))?;

        let deployment_id = parsed.id.map(|id| match id {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        });

        info!(%target, app, url = %endpoint, "deployment ready");
        Ok(Deployment {
            url: endpoint,
            deployment_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{Value, json};

    use super::*;
    use crate::testing::serve;

    type Seen = Arc<Mutex<Vec<(Option<String>, Value)>>>;

    async fn platform(
        State(seen): State<Seen>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        seen.lock().unwrap().push((auth, body.clone()));

        let target = body["target"].as_str().unwrap_or_default();
        if body["files"].get("index.js").is_none() {
            return (
                StatusCode::OK,
                Json(json!({"id": 7, "status": "build_failed", "logs": "missing index.js"})),
            );
        }
        (
            StatusCode::CREATED,
            Json(json!({
                "id": format!("dep-{target}"),
                "url": format!("https://{target}.platform.test/{}", body["name"].as_str().unwrap_or_default()),
                "status": "ready",
            })),
        )
    }

    async fn deployer() -> (HttpDeployer, Seen) {
        let seen: Seen = Arc::default();
        let base = serve(
            Router::new()
                .route("/v1/deployments", post(platform))
                .with_state(seen.clone()),
        )
        .await;
        let mut config = HttpDeployerConfig::new(base);
        config.token = Some("tok".to_owned());
        (HttpDeployer::new(config).unwrap(), seen)
    }

    fn bundle() -> CodeBundle {
        CodeBundle::from_files([("index.js", "run()"), ("package.json", "{}")]).unwrap()
    }

    #[tokio::test]
    async fn deploy_posts_bundle_and_returns_url() {
        let (deployer, seen) = deployer().await;
        let deployment = deployer
            .deploy("mcp-server-x", &bundle(), DeployTarget::Staging)
            .await
            .unwrap();

        assert_eq!(deployment.url, "https://staging.platform.test/mcp-server-x");
        assert_eq!(deployment.deployment_id.as_deref(), Some("dep-staging"));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0.as_deref(), Some("Bearer tok"));
        assert_eq!(seen[0].1["target"], "staging");
        assert_eq!(seen[0].1["files"]["index.js"], "run()");
    }

    #[tokio::test]
    async fn build_failure_is_reported_with_target() {
        let (deployer, _) = deployer().await;
        let bad = CodeBundle::from_files([("lib.js", "x")]).unwrap();
        let err = deployer
            .deploy("app", &bad, DeployTarget::Production)
            .await
            .unwrap_err();
        assert_eq!(err.target, DeployTarget::Production);
        assert_eq!(err.cause, DeployFailure::BuildFailed("missing index.js".to_owned()));
    }

    #[tokio::test]
    async fn rejection_carries_status_and_body() {
        let base = serve(Router::new().route(
            "/v1/deployments",
            post(|| async { (StatusCode::PAYMENT_REQUIRED, "quota exceeded") }),
        ))
        .await;
        let deployer = HttpDeployer::new(HttpDeployerConfig::new(base)).unwrap();
        let err = deployer
            .deploy("app", &bundle(), DeployTarget::Staging)
            .await
            .unwrap_err();
        assert_eq!(
            err.cause,
            DeployFailure::Rejected {
                status: 402,
                body: "quota exceeded".to_owned()
            }
        );
    }

    #[tokio::test]
    async fn missing_url_is_malformed() {
        let base = serve(Router::new().route(
            "/v1/deployments",
            post(|| async { Json(json!({"id": "x", "status": "ready"})) }),
        ))
        .await;
        let deployer = HttpDeployer::new(HttpDeployerConfig::new(base)).unwrap();
        let err = deployer
            .deploy("app", &bundle(), DeployTarget::Staging)
            .await
            .unwrap_err();
        assert!(matches!(err.cause, DeployFailure::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn connection_refused_is_transport_error() {
        let deployer =
            HttpDeployer::new(HttpDeployerConfig::new("http://127.0.0.1:1")).unwrap();
        let err = deployer
            .deploy("app", &bundle(), DeployTarget::Staging)
            .await
            .unwrap_err();
        assert!(matches!(err.cause, DeployFailure::Transport(_)));
    }
}
