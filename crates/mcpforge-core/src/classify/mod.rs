//! Input classification.
//!
//! A run starts from either an OpenAPI spec reference or a free-text
//! description. [`classify`] maps the raw request onto the closed
//! [`ClassifiedInput`] enum that the generator dispatches on.

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::ClassificationError;
use crate::state::InputKind;

/// Unvalidated input as supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawInput {
    pub openapi_url: Option<String>,
    pub description: Option<String>,
}

impl RawInput {
    pub fn spec(url: impl Into<String>) -> Self {
        Self {
            openapi_url: Some(url.into()),
            description: None,
        }
    }

    pub fn description(text: impl Into<String>) -> Self {
        Self {
            openapi_url: None,
            description: Some(text.into()),
        }
    }
}

/// Input after classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassifiedInput {
    Spec { url: String },
    Description { text: String },
}

impl ClassifiedInput {
    pub fn kind(&self) -> InputKind {
        match self {
            Self::Spec { .. } => InputKind::Spec,
            Self::Description { .. } => InputKind::Description,
        }
    }

    /// The spec URL or the description text.
    pub fn payload(&self) -> &str {
        match self {
            Self::Spec { url } => url,
            Self::Description { text } => text,
        }
    }
}

/// Classify raw input. Pure and deterministic.
///
/// A valid http(s) spec URL wins over a description. An invalid spec
/// reference falls back to the description when one is present.
pub fn classify(raw: &RawInput) -> Result<ClassifiedInput, ClassificationError> {
    let spec = raw
        .openapi_url
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let description = raw
        .description
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    if let Some(reference) = spec {
        if is_http_url(reference) {
            return Ok(ClassifiedInput::Spec {
                url: reference.to_owned(),
            });
        }
        if description.is_none() {
            return Err(ClassificationError::InvalidSpecReference(
                reference.to_owned(),
            ));
        }
    }

    match description {
        Some(text) => Ok(ClassifiedInput::Description {
            text: text.to_owned(),
        }),
        None => Err(ClassificationError::Empty),
    }
}

fn is_http_url(candidate: &str) -> bool {
    let lower = candidate.to_ascii_lowercase();
    if !(lower.starts_with("http://") || lower.starts_with("https://")) {
        return false;
    }
    Url::parse(candidate).is_ok_and(|url| url.host_str().is_some_and(|h| !h.is_empty()))
}
