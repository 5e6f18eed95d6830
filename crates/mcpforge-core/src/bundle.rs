//! Code bundles: relative path -> file content.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// File names recognised as a server entry point, in priority order.
pub const ENTRY_POINTS: &[&str] = &[
    "index.js",
    "index.ts",
    "src/index.js",
    "src/index.ts",
    "server.js",
    "src/server.ts",
    "main.py",
    "server.py",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BundleError {
    #[error("invalid bundle path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },
    #[error("bundle JSON must be an object of path -> string content: {0}")]
    Malformed(String),
    #[error("bundle lists {path:?} more than once")]
    DuplicatePath { path: String },
}

/// A set of source files keyed by unique relative path.
///
/// Backed by a `BTreeMap` so iteration order (and therefore the digest)
/// is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct CodeBundle {
    files: BTreeMap<String, String>,
}

impl CodeBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a bundle, validating every path. Two entries that normalise
    /// to the same path are rejected.
    pub fn from_files<I, P, C>(files: I) -> Result<Self, BundleError>
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<String>,
    {
        let mut bundle = Self::new();
        for (path, content) in files {
            bundle.insert_new(path.into(), content.into())?;
        }
        Ok(bundle)
    }

    fn insert_new(&mut self, path: String, content: String) -> Result<(), BundleError> {
        let path = normalize_path(&path)?;
        if self.files.contains_key(&path) {
            return Err(BundleError::DuplicatePath { path });
        }
        self.files.insert(path, content);
        Ok(())
    }

    /// Insert or replace a file. Leading `./` is stripped.
    pub fn insert(
        &mut self,
        path: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<(), BundleError> {
        let path = normalize_path(&path.into())?;
        self.files.insert(path, content.into());
        Ok(())
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.files.iter().map(|(p, c)| (p.as_str(), c.as_str()))
    }

    pub fn total_bytes(&self) -> usize {
        self.files.values().map(String::len).sum()
    }

    /// Entry-point files present in this bundle, in priority order.
    pub fn entry_points(&self) -> Vec<&str> {
        ENTRY_POINTS
            .iter()
            .copied()
            .filter(|p| self.files.contains_key(*p))
            .collect()
    }

    pub fn has_entry_point(&self) -> bool {
        ENTRY_POINTS.iter().any(|p| self.files.contains_key(*p))
    }

    /// Hex sha256 over every `(path, content)` pair in path order.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for (path, content) in &self.files {
            hasher.update(path.as_bytes());
            hasher.update([0u8]);
            hasher.update(content.as_bytes());
            hasher.update([0u8]);
        }
        hex::encode(hasher.finalize())
    }

    /// One-line summary of what changed between `self` and `next`.
    ///
    /// Line counts are a multiset difference, not a positional diff.
    pub fn diff_summary(&self, next: &CodeBundle) -> String {
        let mut parts = Vec::new();
        for (path, new_content) in &next.files {
            match self.files.get(path) {
                None => parts.push(format!("added {path}")),
                Some(old) if old != new_content => {
                    let (added, removed) = line_delta(old, new_content);
                    parts.push(format!("modified {path} (+{added}/-{removed})"));
                }
                Some(_) => {}
            }
        }
        for path in self.files.keys() {
            if !next.files.contains_key(path) {
                parts.push(format!("removed {path}"));
            }
        }
        if parts.is_empty() {
            "no changes".to_owned()
        } else {
            parts.join("; ")
        }
    }

    /// Render every file for inclusion in an LLM prompt.
    pub fn render_for_prompt(&self) -> String {
        let mut out = String::new();
        for (path, content) in &self.files {
            let _ = writeln!(out, "--- {path} ---");
            out.push_str(content);
            if !content.ends_with('\n') {
                out.push('\n');
            }
        }
        out
    }

    /// Parse a bundle from a JSON value.
    ///
    /// Accepts a flat `{"path": "content"}` object or the same object
    /// wrapped as `{"files": {...}}`.
    pub fn from_json_value(value: serde_json::Value) -> Result<Self, BundleError> {
        let serde_json::Value::Object(mut map) = value else {
            return Err(BundleError::Malformed("top level is not an object".to_owned()));
        };
        if map.len() == 1 && map.get("files").is_some_and(serde_json::Value::is_object) {
            if let Some(inner) = map.remove("files") {
                return Self::from_json_value(inner);
            }
        }

        let mut bundle = Self::new();
        for (path, content) in map {
            match content {
                serde_json::Value::String(s) => bundle.insert_new(path, s)?,
                other => {
                    return Err(BundleError::Malformed(format!(
                        "content of {path:?} is {} rather than a string",
                        json_type_name(&other)
                    )));
                }
            }
        }
        Ok(bundle)
    }
}

impl TryFrom<BTreeMap<String, String>> for CodeBundle {
    type Error = BundleError;

    fn try_from(files: BTreeMap<String, String>) -> Result<Self, Self::Error> {
        Self::from_files(files)
    }
}

impl From<CodeBundle> for BTreeMap<String, String> {
    fn from(bundle: CodeBundle) -> Self {
        bundle.files
    }
}

fn normalize_path(raw: &str) -> Result<String, BundleError> {
    let invalid = |reason| BundleError::InvalidPath {
        path: raw.to_owned(),
        reason,
    };

    let path = raw.trim().trim_start_matches("./");
    if path.is_empty() {
        return Err(invalid("empty path"));
    }
    if path.starts_with('/') || path.contains('\\') || path.contains(':') {
        return Err(invalid("must be a relative forward-slash path"));
    }
    if path.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
        return Err(invalid("must not contain empty, '.' or '..' segments"));
    }
    Ok(path.to_owned())
}

fn line_delta(old: &str, new: &str) -> (usize, usize) {
    let mut counts: HashMap<&str, isize> = HashMap::new();
    for line in old.lines() {
        *counts.entry(line).or_default() -= 1;
    }
    for line in new.lines() {
        *counts.entry(line).or_default() += 1;
    }
    let added = counts.values().filter(|c| **c > 0).map(|c| *c as usize).sum();
    let removed = counts.values().filter(|c| **c < 0).map(|c| c.unsigned_abs()).sum();
    (added, removed)
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> CodeBundle {
        CodeBundle::from_files([
            ("package.json", "{\"name\":\"srv\"}"),
            ("index.js", "console.log('hi');\n"),
        ])
        .unwrap()
    }

    #[test]
    fn rejects_unsafe_paths() {
        for bad in ["", "/etc/passwd", "../escape.js", "a//b.js", "src/../x", "C:\\x.js"] {
            assert!(
                CodeBundle::from_files([(bad, "x")]).is_err(),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn strips_leading_dot_slash() {
        let bundle = CodeBundle::from_files([("./src/index.ts", "x")]).unwrap();
        assert!(bundle.contains("src/index.ts"));
    }

    #[test]
    fn entry_points_in_priority_order() {
        let bundle =
            CodeBundle::from_files([("server.js", "a"), ("index.js", "b"), ("lib.js", "c")])
                .unwrap();
        assert_eq!(bundle.entry_points(), vec!["index.js", "server.js"]);
        assert!(bundle.has_entry_point());

        let no_entry = CodeBundle::from_files([("lib.js", "c")]).unwrap();
        assert!(!no_entry.has_entry_point());
    }

    #[test]
    fn digest_is_order_independent_and_content_sensitive() {
        let a = CodeBundle::from_files([("a.js", "1"), ("b.js", "2")]).unwrap();
        let b = CodeBundle::from_files([("b.js", "2"), ("a.js", "1")]).unwrap();
        assert_eq!(a.digest(), b.digest());
        assert_eq!(a.digest().len(), 64);

        let c = CodeBundle::from_files([("a.js", "1"), ("b.js", "3")]).unwrap();
        assert_ne!(a.digest(), c.digest());

        // Path/content boundaries are separated.
        let d = CodeBundle::from_files([("ab", "c")]).unwrap();
        let e = CodeBundle::from_files([("a", "bc")]).unwrap();
        assert_ne!(d.digest(), e.digest());
    }

    #[test]
    fn diff_summary_reports_changes() {
        let old = sample();
        let mut new = old.clone();
        new.insert("index.js", "console.log('hi');\nconsole.log('bye');\n")
            .unwrap();
        new.insert("README.md", "docs").unwrap();

        let summary = old.diff_summary(&new);
        assert!(summary.contains("modified index.js (+1/-0)"), "{summary}");
        assert!(summary.contains("added README.md"), "{summary}");
        assert_eq!(old.diff_summary(&old), "no changes");
    }

    #[test]
    fn parses_flat_and_wrapped_json() {
        let flat = CodeBundle::from_json_value(json!({"index.js": "x", "package.json": "{}"}))
            .unwrap();
        assert_eq!(flat.len(), 2);

        let wrapped =
            CodeBundle::from_json_value(json!({"files": {"index.js": "x", "package.json": "{}"}}))
                .unwrap();
        assert_eq!(flat, wrapped);
    }

    #[test]
    fn rejects_non_string_content() {
        let err = CodeBundle::from_json_value(json!({"index.js": 42})).unwrap_err();
        assert!(matches!(err, BundleError::Malformed(_)));
        assert!(CodeBundle::from_json_value(json!(["index.js"])).is_err());
    }

    #[test]
    fn single_file_named_files_is_kept() {
        let bundle = CodeBundle::from_json_value(json!({"files": "serve();"})).unwrap();
        assert_eq!(bundle.get("files"), Some("serve();"));
    }

    #[test]
    fn paths_that_normalise_alike_are_rejected() {
        let err = CodeBundle::from_json_value(json!({"a.js": "1", "./a.js": "2"})).unwrap_err();
        assert_eq!(
            err,
            BundleError::DuplicatePath {
                path: "a.js".to_owned()
            }
        );
        assert!(CodeBundle::from_files([("src/x.ts", "1"), ("./src/x.ts", "2")]).is_err());
    }

    #[test]
    fn serde_validates_paths() {
        let bundle: CodeBundle = serde_json::from_value(json!({"index.js": "x"})).unwrap();
        assert_eq!(bundle.get("index.js"), Some("x"));
        assert!(serde_json::from_value::<CodeBundle>(json!({"../x": "y"})).is_err());
        assert_eq!(serde_json::to_value(&bundle).unwrap(), json!({"index.js": "x"}));
    }

    #[test]
    fn render_includes_every_file() {
        let rendered = sample().render_for_prompt();
        assert!(rendered.contains("--- index.js ---"));
        assert!(rendered.contains("--- package.json ---"));
    }
}
