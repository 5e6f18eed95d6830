//! Code repair adapters.

pub mod analysis;
pub mod llm;
pub mod morph;

use std::collections::BTreeMap;

use async_trait::async_trait;

pub use analysis::{ErrorPattern, FailureAnalysis, analyze_failures, fix_instructions};
pub use llm::LlmRefiner;
pub use morph::{MorphConfig, MorphRefiner};

use crate::bundle::CodeBundle;
use crate::error::RefinementError;
use crate::state::CheckFailure;

/// A repaired bundle and a human-readable summary of the change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refinement {
    pub bundle: CodeBundle,
    pub diff_summary: String,
}

/// Proposes a modified bundle intended to fix the given failures.
///
/// Convergence is not promised; only the next test run decides.
#[async_trait]
pub trait Refiner: Send + Sync {
    fn name(&self) -> &str;

    async fn refine(
        &self,
        bundle: &CodeBundle,
        failures: &[CheckFailure],
    ) -> Result<Refinement, RefinementError>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn Refiner) {}
};

/// Apply whole-file replacements to `bundle`.
///
/// Every edited path must already exist and at least one file must
/// actually change.
pub fn apply_edits(
    bundle: &CodeBundle,
    edits: BTreeMap<String, String>,
    note: Option<&str>,
) -> Result<Refinement, RefinementError> {
    if edits.is_empty() {
        return Err(RefinementError::EmptyProposal);
    }

    let mut next = bundle.clone();
    for (path, content) in edits {
        let key = path.trim().trim_start_matches("./");
        if !bundle.contains(key) {
            return Err(RefinementError::UnknownFile(path));
        }
        next.insert(key, content)
            .map_err(|e| RefinementError::Backend(e.to_string()))?;
    }

    if next.digest() == bundle.digest() {
        return Err(RefinementError::NoChange);
    }

    let changes = bundle.diff_summary(&next);
    let diff_summary = match note.map(str::trim).filter(|n| !n.is_empty()) {
        Some(note) => format!("{note} ({changes})"),
        None => changes,
    };
    Ok(Refinement {
        bundle: next,
        diff_summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle() -> CodeBundle {
        CodeBundle::from_files([("index.js", "a\nb\n"), ("package.json", "{}")]).unwrap()
    }

    fn edits(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(p, c)| ((*p).to_owned(), (*c).to_owned()))
            .collect()
    }

    #[test]
    fn applies_replacement() {
        let refinement =
            apply_edits(&bundle(), edits(&[("./index.js", "a\nc\n")]), Some("fix tools")).unwrap();
        assert_eq!(refinement.bundle.get("index.js"), Some("a\nc\n"));
        assert_eq!(refinement.bundle.get("package.json"), Some("{}"));
        assert_eq!(refinement.diff_summary, "fix tools (modified index.js (+1/-1))");
    }

    #[test]
    fn rejects_empty_unknown_and_noop() {
        assert_eq!(
            apply_edits(&bundle(), BTreeMap::new(), None).unwrap_err(),
            RefinementError::EmptyProposal
        );
        assert_eq!(
            apply_edits(&bundle(), edits(&[("new.js", "x")]), None).unwrap_err(),
            RefinementError::UnknownFile("new.js".to_owned())
        );
        assert_eq!(
            apply_edits(&bundle(), edits(&[("index.js", "a\nb\n")]), None).unwrap_err(),
            RefinementError::NoChange
        );
    }
}
