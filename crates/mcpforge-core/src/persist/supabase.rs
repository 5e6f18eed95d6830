//! Persist through a Supabase (PostgREST) table endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;

use super::{PersistRequest, Persister, connection_parameters};
use crate::error::PersistenceError;

#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`.
    pub url: String,
    pub api_key: String,
    pub table: String,
    pub request_timeout: Duration,
}

impl SupabaseConfig {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            table: "mcp_servers".to_owned(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

pub struct SupabasePersister {
    config: SupabaseConfig,
    client: reqwest::Client,
}

impl SupabasePersister {
    pub fn new(config: SupabaseConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl Persister for SupabasePersister {
    fn name(&self) -> &str {
        "supabase"
    }

    async fn persist(&self, request: &PersistRequest<'_>) -> Result<String, PersistenceError> {
        let url = format!(
            "{}/rest/v1/{}",
            self.config.url.trim_end_matches('/'),
            self.config.table
        );
        let row = json!({
            "name": request.name,
            "project_id": request.project_id,
            "parameters": connection_parameters(request.url),
            "description": request.description,
        });

        let response = self
            .client
            .post(&url)
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
            .header("Prefer", "return=representation")
            .json(&row)
            .send()
            .await
            .map_err(|e| PersistenceError::Backend(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PersistenceError::Backend(format!(
                "Supabase insert failed ({status}): {body}"
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| PersistenceError::Backend(format!("Supabase response: {e}")))?;
        let record = match &body {
            Value::Array(rows) => rows.first(),
            other => Some(other),
        };
        let id = match record.and_then(|r| r.get("id")) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                return Err(PersistenceError::Backend(
                    "Supabase response has no record id".to_owned(),
                ));
            }
        };

        info!(record_id = %id, table = %self.config.table, "recorded mcp server in Supabase");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};

    use super::*;
    use crate::testing::serve;

    type Rows = Arc<Mutex<Vec<Value>>>;

    async fn insert(
        State(rows): State<Rows>,
        headers: HeaderMap,
        Json(row): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        if headers.get("apikey").and_then(|v| v.to_str().ok()) != Some("anon") {
            return (StatusCode::UNAUTHORIZED, Json(json!({"message": "bad key"})));
        }
        rows.lock().unwrap().push(row.clone());
        let mut stored = row;
        stored["id"] = json!("7f1c");
        (StatusCode::CREATED, Json(json!([stored])))
    }

    async fn persister(key: &str) -> (SupabasePersister, Rows) {
        let rows: Rows = Arc::default();
        let base = serve(
            Router::new()
                .route("/rest/v1/mcp_servers", post(insert))
                .with_state(rows.clone()),
        )
        .await;
        (
            SupabasePersister::new(SupabaseConfig::new(base, key)).unwrap(),
            rows,
        )
    }

    fn request() -> PersistRequest<'static> {
        PersistRequest {
            project_id: "proj-1",
            name: "mcp-spec-20260101-000000",
            url: "https://prod.test/mcp",
            description: Some("petstore"),
        }
    }

    #[tokio::test]
    async fn inserts_row_and_returns_id() {
        let (persister, rows) = persister("anon").await;
        let id = persister.persist(&request()).await.unwrap();
        assert_eq!(id, "7f1c");

        let rows = rows.lock().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["project_id"], "proj-1");
        assert_eq!(rows[0]["parameters"]["args"][2], "https://prod.test/mcp");
        assert_eq!(rows[0]["parameters"]["transport"], "streamable-http");
    }

    #[tokio::test]
    async fn rejected_insert_is_backend_error() {
        let (persister, _) = persister("wrong").await;
        let err = persister.persist(&request()).await.unwrap_err();
        assert!(matches!(err, PersistenceError::Backend(msg) if msg.contains("401")));
    }
}
