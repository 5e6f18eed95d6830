//! Failure analysis shared by the refiners.

use std::collections::BTreeSet;
use std::fmt::{self, Write as _};

use crate::bundle::CodeBundle;
use crate::state::CheckFailure;

/// Coarse category of a failed check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorPattern {
    ServerConnection,
    ProtocolInitialization,
    ToolDefinition,
    ToolInvocation,
    ErrorHandling,
    Other,
}

impl ErrorPattern {
    pub fn of(failure: &CheckFailure) -> Self {
        let name = failure.check_name.as_str();
        match name {
            "liveness" | "harness" => Self::ServerConnection,
            "handshake" => Self::ProtocolInitialization,
            "tools_list" => Self::ToolDefinition,
            "error_path" => Self::ErrorHandling,
            _ if name.starts_with("tool_schema:") => Self::ToolDefinition,
            _ if name.starts_with("invoke:") => Self::ToolInvocation,
            _ => Self::Other,
        }
    }

    pub fn suggested_fix(self) -> &'static str {
        match self {
            Self::ServerConnection => {
                "Make sure the server process starts without crashing and listens on the \
                 port from the PORT environment variable"
            }
            Self::ProtocolInitialization => {
                "Answer `initialize` with protocolVersion, a capabilities object and \
                 serverInfo.name, and accept the notifications/initialized notification"
            }
            Self::ToolDefinition => {
                "Register at least one tool and give every tool a non-empty name and an \
                 inputSchema of type \"object\""
            }
            Self::ToolInvocation => {
                "Return tool results as {content: [{type: \"text\", text: ...}]} and \
                 tolerate minimal arguments"
            }
            Self::ErrorHandling => {
                "Reply to malformed JSON and unknown methods with JSON-RPC error objects \
                 instead of crashing"
            }
            Self::Other => "Inspect the failing checks and correct the server behaviour",
        }
    }
}

impl fmt::Display for ErrorPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ServerConnection => "Server connection issues",
            Self::ProtocolInitialization => "Protocol initialization errors",
            Self::ToolDefinition => "Tool-related errors",
            Self::ToolInvocation => "Tool invocation errors",
            Self::ErrorHandling => "Error handling issues",
            Self::Other => "Other failures",
        })
    }
}

/// Failures grouped into patterns with suggested fixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureAnalysis {
    pub failed_checks: Vec<CheckFailure>,
    pub error_patterns: Vec<ErrorPattern>,
    pub suggested_fixes: Vec<&'static str>,
}

pub fn analyze_failures(failures: &[CheckFailure]) -> FailureAnalysis {
    let patterns: BTreeSet<ErrorPattern> = failures.iter().map(ErrorPattern::of).collect();
    FailureAnalysis {
        failed_checks: failures.to_vec(),
        suggested_fixes: patterns.iter().map(|p| p.suggested_fix()).collect(),
        error_patterns: patterns.into_iter().collect(),
    }
}

/// Edit instructions for one file.
///
/// Always ends with the baseline checklist so every edit keeps the
/// server start-up, tool definitions and initialization intact.
pub fn fix_instructions(path: &str, analysis: &FailureAnalysis) -> String {
    let mut out = format!("Fix the following issues in {path}:\n");
    for failure in &analysis.failed_checks {
        let _ = writeln!(out, "- {failure}");
    }
    if !analysis.error_patterns.is_empty() {
        out.push_str("\nDetected problems:\n");
        for (pattern, fix) in analysis.error_patterns.iter().zip(&analysis.suggested_fixes) {
            let _ = writeln!(out, "- {pattern}: {fix}");
        }
    }
    out.push_str(
        "\nAlso ensure that:\n\
         - the server starts correctly and keeps running\n\
         - all tools have proper name, description and inputSchema fields\n\
         - the MCP protocol initialization handshake succeeds\n",
    );
    out
}

/// Files worth editing: entry points plus any bundle path named in a
/// failure detail.
pub fn target_files<'a>(bundle: &'a CodeBundle, failures: &[CheckFailure]) -> Vec<&'a str> {
    let mut targets: Vec<&str> = bundle.entry_points();
    for path in bundle.paths() {
        if targets.contains(&path) {
            continue;
        }
        if failures.iter().any(|f| f.detail.contains(path)) {
            targets.push(path);
        }
    }
    targets
}
