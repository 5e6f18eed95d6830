//! Chat-completion backend shared by the description generator and the
//! LLM refiner.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_ANTHROPIC_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LlmError {
    #[error("LLM API key is not configured")]
    MissingApiKey,
    #[error("failed to build HTTP client: {0}")]
    Client(String),
    #[error("LLM request failed: {0}")]
    Request(String),
    #[error("LLM API error ({status}): {body}")]
    Status { status: u16, body: String },
    #[error("failed to parse LLM response: {0}")]
    Parse(String),
    #[error("LLM returned no text content")]
    EmptyResponse,
}

/// A single-turn completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            max_tokens: 8192,
            temperature: 0.1,
        }
    }
}

/// A text-completion backend.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    fn model(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn CompletionBackend) {}
};

// ---------------------------------------------------------------------------
// Anthropic Messages API
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub request_timeout: Duration,
}

impl AnthropicConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_owned(),
            base_url: DEFAULT_ANTHROPIC_URL.to_owned(),
            request_timeout: Duration::from_secs(300),
        }
    }
}

/// [`CompletionBackend`] over `POST {base_url}/v1/messages`.
pub struct AnthropicClient {
    config: AnthropicConfig,
    client: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(config: AnthropicConfig) -> Result<Self, LlmError> {
        if config.api_key.trim().is_empty() {
            return Err(LlmError::MissingApiKey);
        }
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| LlmError::Client(e.to_string()))?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl CompletionBackend for AnthropicClient {
    fn model(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let body = serde_json::json!({
            "model": self.config.model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "system": request.system,
            "messages": [{
                "role": "user",
                "content": request.prompt,
            }],
        });

        let url = format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'));
        debug!(model = %self.config.model, url = %url, "sending completion request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status { status, body });
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        // Concatenate every text block; tool-use blocks are ignored.
        let text: String = json["content"]
            .as_array()
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|b| b["type"] == "text")
                    .filter_map(|b| b["text"].as_str())
                    .collect()
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(text)
    }
}

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

/// Extract the JSON object embedded in a model reply.
///
/// A reply that is already a JSON object is taken as is. Otherwise a
/// reply that opens with a code fence is read up to its last fence, and
/// as a last resort the span from the first `{` to the last `}` is parsed.
pub fn extract_json(text: &str) -> Result<serde_json::Value, LlmError> {
    let trimmed = text.trim();
    if let Ok(value @ serde_json::Value::Object(_)) = serde_json::from_str(trimmed) {
        return Ok(value);
    }
    let candidate = fenced_block(trimmed).unwrap_or(trimmed);
    let start = candidate.find('{');
    let end = candidate.rfind('}');
    let slice = match (start, end) {
        (Some(s), Some(e)) if s < e => &candidate[s..=e],
        _ => return Err(LlmError::Parse("no JSON object in reply".to_owned())),
    };
    serde_json::from_str(slice).map_err(|e| LlmError::Parse(e.to_string()))
}

/// Body of a reply that starts with a fence, closed by the last fence.
/// Fences inside JSON string values therefore stay part of the body.
fn fenced_block(text: &str) -> Option<&str> {
    let after_fence = text.strip_prefix("```")?;
    // Skip an info string such as `json`.
    let body_start = after_fence.find('\n')? + 1;
    let body = &after_fence[body_start..];
    let close = body.rfind("```")?;
    Some(&body[..close])
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Json;
    use axum::Router;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use serde_json::{Value, json};

    use crate::testing::serve;

    #[test]
    fn extract_json_from_fenced_block() {
        let reply = "Here you go:\n```json\n{\"index.js\": \"x\"}\n```\nDone.";
        assert_eq!(extract_json(reply).unwrap(), json!({"index.js": "x"}));
    }

    #[test]
    fn extract_json_from_bare_text() {
        let reply = "Sure. {\"a\": {\"b\": 1}} hope that helps";
        assert_eq!(extract_json(reply).unwrap(), json!({"a": {"b": 1}}));
    }

    #[test]
    fn extract_json_keeps_fences_inside_string_values() {
        let reply = "{\n  \"README.md\": \"Usage:\\n```sh\\nnpm start\\n```\\n\",\n  \"index.js\": \"// markdown ``` in help text\\nserve()\"\n}";
        let value = extract_json(reply).unwrap();
        assert_eq!(value["README.md"], "Usage:\n```sh\nnpm start\n```\n");
        assert_eq!(value["index.js"], "// markdown ``` in help text\nserve()");
    }

    #[test]
    fn extract_json_fenced_reply_with_nested_fences() {
        let reply = "```json\n{\"README.md\": \"```sh\\nnpm start\\n```\"}\n```";
        assert_eq!(
            extract_json(reply).unwrap(),
            json!({"README.md": "```sh\nnpm start\n```"})
        );
    }

    #[test]
    fn extract_json_rejects_prose() {
        assert!(matches!(
            extract_json("no json here"),
            Err(LlmError::Parse(_))
        ));
    }

    #[test]
    fn empty_api_key_is_rejected() {
        assert!(matches!(
            AnthropicClient::new(AnthropicConfig::new("  ")),
            Err(LlmError::MissingApiKey)
        ));
    }

    async fn messages(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        if headers.get("x-api-key").and_then(|v| v.to_str().ok()) != Some("sk-test") {
            return (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad key"})));
        }
        assert_eq!(headers["anthropic-version"], ANTHROPIC_VERSION);
        let prompt = body["messages"][0]["content"].as_str().unwrap_or_default();
        (
            StatusCode::OK,
            Json(json!({
                "content": [
                    {"type": "text", "text": "echo: "},
                    {"type": "text", "text": prompt},
                ]
            })),
        )
    }

    fn client(base_url: String, key: &str) -> AnthropicClient {
        let mut config = AnthropicConfig::new(key);
        config.base_url = base_url;
        AnthropicClient::new(config).unwrap()
    }

    #[tokio::test]
    async fn complete_concatenates_text_blocks() {
        let base = serve(Router::new().route("/v1/messages", post(messages))).await;
        let reply = client(base, "sk-test")
            .complete(&CompletionRequest::new("sys", "hello"))
            .await
            .unwrap();
        assert_eq!(reply, "echo: hello");
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let base = serve(Router::new().route("/v1/messages", post(messages))).await;
        let err = client(base, "sk-wrong")
            .complete(&CompletionRequest::new("sys", "hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Status { status: 401, .. }), "{err}");
    }
}
