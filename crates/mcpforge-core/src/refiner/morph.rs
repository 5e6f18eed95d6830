//! Per-file repair through the Morph fast-apply endpoint.
//!
//! Each target file is sent as
//!
//! ```text
//! <instruction>{fix instructions}</instruction>
//! <code>{current content}</code>
//! <update>Apply the changes as instructed</update>
//! ```
//!
//! to an OpenAI-compatible `/v1/chat/completions` endpoint and replaced
//! by `choices[0].message.content`.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::analysis::{analyze_failures, fix_instructions, target_files};
use super::{Refinement, Refiner, apply_edits};
use crate::bundle::CodeBundle;
use crate::error::RefinementError;
use crate::state::CheckFailure;

pub const DEFAULT_MORPH_URL: &str = "https://api.morphllm.com";
pub const DEFAULT_MORPH_MODEL: &str = "morph-v3-large";

#[derive(Debug, Clone)]
pub struct MorphConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub request_timeout: Duration,
}

impl MorphConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_MORPH_URL.to_owned(),
            model: DEFAULT_MORPH_MODEL.to_owned(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

pub struct MorphRefiner {
    config: MorphConfig,
    client: reqwest::Client,
}

impl MorphRefiner {
    pub fn new(config: MorphConfig) -> anyhow::Result<Self> {
        anyhow::ensure!(!config.api_key.trim().is_empty(), "Morph API key is required");
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { config, client })
    }

    async fn apply(&self, instructions: &str, content: &str) -> Result<String, RefinementError> {
        let message = format!(
            "<instruction>{instructions}</instruction>\n<code>{content}</code>\n\
             <update>Apply the changes as instructed</update>"
        );
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [{"role": "user", "content": message}],
            "stream": false,
        });
        let url = format!(
            "{}/v1/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| RefinementError::Backend(format!("Morph request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RefinementError::Backend(format!(
                "Morph API error ({status}): {body}"
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RefinementError::Backend(format!("Morph response: {e}")))?;
        json.pointer("/choices/0/message/content")
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| RefinementError::Backend("no edited code returned from Morph".to_owned()))
    }
}

#[async_trait]
impl Refiner for MorphRefiner {
    fn name(&self) -> &str {
        "morph"
    }

    async fn refine(
        &self,
        bundle: &CodeBundle,
        failures: &[CheckFailure],
    ) -> Result<Refinement, RefinementError> {
        let analysis = analyze_failures(failures);
        let targets = target_files(bundle, failures);
        if targets.is_empty() {
            return Err(RefinementError::EmptyProposal);
        }

        let mut edits = BTreeMap::new();
        for path in targets {
            let Some(current) = bundle.get(path) else {
                continue;
            };
            let instructions = fix_instructions(path, &analysis);
            let edited = self.apply(&instructions, current).await?;
            debug!(path, changed = edited != current, "morph applied edit");
            if edited != current {
                edits.insert(path.to_owned(), edited);
            }
        }

        if edits.is_empty() {
            return Err(RefinementError::NoChange);
        }
        apply_edits(bundle, edits, Some("morph fast-apply"))
    }
}
