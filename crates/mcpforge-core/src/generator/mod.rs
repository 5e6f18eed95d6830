//! Code generation adapters.
//!
//! ```text
//! ClassifiedInput ──► RoutingGenerator
//!                       ├─ Spec        ──► OpenApiGenerator     (external command)
//!                       └─ Description ──► DescriptionGenerator (LLM)
//! ```

pub mod description;
pub mod openapi;

use std::sync::Arc;

use async_trait::async_trait;

pub use description::DescriptionGenerator;
pub use openapi::{OpenApiGenerator, OpenApiGeneratorConfig};

use crate::bundle::CodeBundle;
use crate::classify::ClassifiedInput;
use crate::error::GenerationError;

/// Produces a complete code bundle from classified input.
///
/// Implementations return either a full bundle or an error, never a
/// partial bundle.
#[async_trait]
pub trait Generator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, input: &ClassifiedInput) -> Result<CodeBundle, GenerationError>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn Generator) {}
};

/// Dispatches on the input kind to one backend per kind.
pub struct RoutingGenerator {
    spec: Arc<dyn Generator>,
    description: Arc<dyn Generator>,
}

impl RoutingGenerator {
    pub fn new(spec: Arc<dyn Generator>, description: Arc<dyn Generator>) -> Self {
        Self { spec, description }
    }
}

#[async_trait]
impl Generator for RoutingGenerator {
    fn name(&self) -> &str {
        "routing"
    }

    async fn generate(&self, input: &ClassifiedInput) -> Result<CodeBundle, GenerationError> {
        let backend = match input {
            ClassifiedInput::Spec { .. } => &self.spec,
            ClassifiedInput::Description { .. } => &self.description,
        };
        tracing::debug!(kind = %input.kind(), backend = backend.name(), "routing generation");
        backend.generate(input).await
    }
}
