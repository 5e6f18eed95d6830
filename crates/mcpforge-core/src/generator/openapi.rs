//! Spec-driven generation through an external spec-to-code command.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::Generator;
use crate::bundle::CodeBundle;
use crate::classify::ClassifiedInput;
use crate::error::GenerationError;

/// Directories never copied from generator output.
const SKIPPED_DIRS: &[&str] = &["node_modules", ".git"];

#[derive(Debug, Clone)]
pub struct OpenApiGeneratorConfig {
    /// Executable to run.
    pub program: String,
    /// Arguments placed before `--input <url> --output <dir>`.
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl Default for OpenApiGeneratorConfig {
    fn default() -> Self {
        Self {
            program: "npx".to_owned(),
            args: vec!["openapi-mcp-generator".to_owned()],
            timeout: Duration::from_secs(120),
        }
    }
}

/// Runs `<program> <args..> --input <url> --output <tmpdir>` and reads
/// every generated file into a bundle.
pub struct OpenApiGenerator {
    config: OpenApiGeneratorConfig,
}

impl OpenApiGenerator {
    pub fn new(config: OpenApiGeneratorConfig) -> Self {
        Self { config }
    }

    async fn run_command(&self, url: &str, output: &Path) -> Result<(), GenerationError> {
        let mut child = Command::new(&self.config.program)
            .args(&self.config.args)
            .arg("--input")
            .arg(url)
            .arg("--output")
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                GenerationError::Backend(format!(
                    "failed to spawn {}: {e}",
                    self.config.program
                ))
            })?;

        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();
        let read_stdout = async {
            let mut buf = Vec::new();
            if let Some(pipe) = stdout_pipe.as_mut() {
                pipe.read_to_end(&mut buf).await.ok();
            }
            String::from_utf8_lossy(&buf).into_owned()
        };
        let read_stderr = async {
            let mut buf = Vec::new();
            if let Some(pipe) = stderr_pipe.as_mut() {
                pipe.read_to_end(&mut buf).await.ok();
            }
            String::from_utf8_lossy(&buf).into_owned()
        };

        let outcome = tokio::time::timeout(self.config.timeout, async {
            tokio::join!(child.wait(), read_stdout, read_stderr)
        })
        .await;

        match outcome {
            Ok((Ok(status), stdout, stderr)) => {
                debug!(status = ?status.code(), stdout_len = stdout.len(), "generator exited");
                if status.success() {
                    Ok(())
                } else {
                    let detail = if stderr.trim().is_empty() { stdout } else { stderr };
                    Err(GenerationError::Backend(format!(
                        "{} exited with {}: {}",
                        self.config.program,
                        status
                            .code()
                            .map_or_else(|| "a signal".to_owned(), |c| format!("code {c}")),
                        detail.trim()
                    )))
                }
            }
            Ok((Err(e), _, _)) => Err(GenerationError::Backend(format!(
                "failed to wait on {}: {e}",
                self.config.program
            ))),
            Err(_) => {
                let _ = child.kill().await;
                Err(GenerationError::Timeout(self.config.timeout))
            }
        }
    }
}

impl Default for OpenApiGenerator {
    fn default() -> Self {
        Self::new(OpenApiGeneratorConfig::default())
    }
}

#[async_trait]
impl Generator for OpenApiGenerator {
    fn name(&self) -> &str {
        "openapi"
    }

    async fn generate(&self, input: &ClassifiedInput) -> Result<CodeBundle, GenerationError> {
        let ClassifiedInput::Spec { url } = input else {
            return Err(GenerationError::UnsupportedInput {
                generator: "openapi",
                input: input.kind().to_string(),
            });
        };

        let workdir = tempfile::tempdir()
            .map_err(|e| GenerationError::Backend(format!("failed to create temp dir: {e}")))?;
        let output = workdir.path().join("out");

        self.run_command(url, &output).await?;

        let bundle = tokio::task::spawn_blocking(move || read_tree(&output))
            .await
            .map_err(|e| GenerationError::Backend(format!("bundle reader panicked: {e}")))??;

        if bundle.is_empty() {
            return Err(GenerationError::EmptyBundle);
        }
        debug!(files = bundle.len(), bytes = bundle.total_bytes(), "read generated bundle");
        Ok(bundle)
    }
}

/// Read every file under `root` into a bundle keyed by relative path.
///
/// A file that is not UTF-8 text fails the whole read.
fn read_tree(root: &Path) -> Result<CodeBundle, GenerationError> {
    let mut bundle = CodeBundle::new();
    if !root.exists() {
        return Ok(bundle);
    }

    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        !(entry.file_type().is_dir()
            && entry
                .file_name()
                .to_str()
                .is_some_and(|n| SKIPPED_DIRS.contains(&n)))
    });

    for entry in walker {
        let entry = entry
            .map_err(|e| GenerationError::Backend(format!("failed to walk output: {e}")))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| GenerationError::Backend(e.to_string()))?;
        let Some(key) = relative.to_str().map(|s| s.replace('\\', "/")) else {
            return Err(GenerationError::MalformedBundle(format!(
                "generated path is not UTF-8: {}",
                relative.display()
            )));
        };
        let content = std::fs::read_to_string(entry.path()).map_err(|e| {
            warn!(path = %key, error = %e, "unreadable generated file");
            GenerationError::MalformedBundle(format!("cannot read generated file {key}: {e}"))
        })?;
        bundle
            .insert(key, content)
            .map_err(|e| GenerationError::MalformedBundle(e.to_string()))?;
    }
    Ok(bundle)
}
