//! Description-driven generation through an LLM.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::Generator;
use crate::bundle::{CodeBundle, ENTRY_POINTS};
use crate::classify::ClassifiedInput;
use crate::error::GenerationError;
use crate::llm::{self, CompletionBackend, CompletionRequest};

const SYSTEM_PROMPT: &str = "You write Model Context Protocol (MCP) servers. \
Reply with a single JSON object mapping relative file paths to complete file \
contents and nothing else.";

/// Asks the completion backend for a Node.js MCP server bundle.
pub struct DescriptionGenerator {
    backend: Arc<dyn CompletionBackend>,
}

impl DescriptionGenerator {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }
}

fn prompt_for(description: &str) -> String {
    format!(
        "Generate a complete MCP server based on this description:\n\
         {description}\n\n\
         Create a Node.js MCP server with:\n\
         1. package.json with proper dependencies (@modelcontextprotocol/sdk)\n\
         2. index.js as the main server file, serving the streamable HTTP transport \
            on the port given by the PORT environment variable\n\
         3. Any additional files needed\n\n\
         Every tool must declare a name, a description and an inputSchema of type \"object\".\n\
         Return the files as JSON with filename -> content mapping."
    )
}

#[async_trait]
impl Generator for DescriptionGenerator {
    fn name(&self) -> &str {
        "description"
    }

    async fn generate(&self, input: &ClassifiedInput) -> Result<CodeBundle, GenerationError> {
        let ClassifiedInput::Description { text } = input else {
            return Err(GenerationError::UnsupportedInput {
                generator: "description",
                input: input.kind().to_string(),
            });
        };

        let request = CompletionRequest::new(SYSTEM_PROMPT, prompt_for(text));
        let reply = self
            .backend
            .complete(&request)
            .await
            .map_err(|e| GenerationError::Backend(e.to_string()))?;

        let value =
            llm::extract_json(&reply).map_err(|e| GenerationError::MalformedBundle(e.to_string()))?;
        let bundle = CodeBundle::from_json_value(value)
            .map_err(|e| GenerationError::MalformedBundle(e.to_string()))?;

        if bundle.is_empty() {
            return Err(GenerationError::EmptyBundle);
        }
        if !bundle.has_entry_point() {
            return Err(GenerationError::MissingEntryPoint {
                expected: ENTRY_POINTS.join(", "),
            });
        }

        debug!(model = self.backend.model(), files = bundle.len(), "generated bundle from description");
        Ok(bundle)
    }
}
