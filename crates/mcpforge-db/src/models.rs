use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Final outcome of an archived generation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Pending,
    Success,
    Failed,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl FromStr for RunOutcome {
    type Err = RunOutcomeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            other => Err(RunOutcomeParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`RunOutcome`] string.
#[derive(Debug, Clone)]
pub struct RunOutcomeParseError(pub String);

impl fmt::Display for RunOutcomeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid run outcome: {:?}", self.0)
    }
}

impl std::error::Error for RunOutcomeParseError {}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// How an MCP client reaches a deployed server.
///
/// Stored as JSONB in `mcp_servers.parameters`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerParameters {
    /// Executable the client launches (e.g. `npx`).
    pub command: String,
    /// Arguments passed to `command`.
    pub args: Vec<String>,
    /// Transport name (e.g. `streamable-http`).
    pub transport: String,
    /// Production endpoint of the server.
    pub url: String,
}

/// A row in the `mcp_servers` table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct McpServer {
    pub id: Uuid,
    pub name: String,
    pub project_id: String,
    pub parameters: Json<ServerParameters>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A row in the `generation_runs` table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GenerationRun {
    pub id: Uuid,
    pub input_kind: String,
    pub outcome: RunOutcome,
    pub iterations: i32,
    pub production_url: Option<String>,
    pub persisted_id: Option<String>,
    pub error_count: i32,
    /// Full JSON snapshot of the final workflow state.
    pub state: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
