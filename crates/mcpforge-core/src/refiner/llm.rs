//! Whole-bundle repair through a completion backend.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::analysis::{analyze_failures, fix_instructions};
use super::{Refinement, Refiner, apply_edits};
use crate::bundle::CodeBundle;
use crate::error::RefinementError;
use crate::llm::{self, CompletionBackend, CompletionRequest};
use crate::state::CheckFailure;

const SYSTEM_PROMPT: &str = "You repair Model Context Protocol (MCP) servers that fail \
compliance checks. Reply with one JSON object of the form \
{\"summary\": \"<one line>\", \"files\": {\"<existing path>\": \"<full new content>\"}}. \
Only include files you change and never invent new paths.";

#[derive(Debug, Deserialize)]
struct Proposal {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    files: BTreeMap<String, String>,
}

pub struct LlmRefiner {
    backend: Arc<dyn CompletionBackend>,
}

impl LlmRefiner {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }
}

fn build_prompt(bundle: &CodeBundle, failures: &[CheckFailure]) -> String {
    let analysis = analyze_failures(failures);
    let entry = bundle.entry_points().first().copied().unwrap_or("the server");
    let mut prompt = fix_instructions(entry, &analysis);
    let _ = write!(
        prompt,
        "\nCurrent files:\n{}\nReturn the JSON object now.",
        bundle.render_for_prompt()
    );
    prompt
}

#[async_trait]
impl Refiner for LlmRefiner {
    fn name(&self) -> &str {
        "llm"
    }

    async fn refine(
        &self,
        bundle: &CodeBundle,
        failures: &[CheckFailure],
    ) -> Result<Refinement, RefinementError> {
        let request = CompletionRequest::new(SYSTEM_PROMPT, build_prompt(bundle, failures));
        let reply = self
            .backend
            .complete(&request)
            .await
            .map_err(|e| RefinementError::Backend(e.to_string()))?;

        let value = llm::extract_json(&reply).map_err(|e| RefinementError::Backend(e.to_string()))?;
        let proposal: Proposal = serde_json::from_value(value)
            .map_err(|e| RefinementError::Backend(format!("unexpected proposal shape: {e}")))?;

        debug!(
            model = self.backend.model(),
            files = proposal.files.len(),
            "received refinement proposal"
        );
        apply_edits(bundle, proposal.files, proposal.summary.as_deref())
    }
}
