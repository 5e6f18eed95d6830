//! Recording production deployments.
//!
//! A persister runs only after a successful production deploy, and its
//! failure never fails the run.

pub mod postgres;
pub mod supabase;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use postgres::PgPersister;
pub use supabase::{SupabaseConfig, SupabasePersister};

use mcpforge_db::models::ServerParameters;

use crate::error::PersistenceError;
use crate::state::InputKind;

/// What gets recorded for a production deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistRequest<'a> {
    pub project_id: &'a str,
    pub name: &'a str,
    pub url: &'a str,
    pub description: Option<&'a str>,
}

#[async_trait]
pub trait Persister: Send + Sync {
    fn name(&self) -> &str;

    /// Store the record and return its id.
    async fn persist(&self, request: &PersistRequest<'_>) -> Result<String, PersistenceError>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn Persister) {}
};

/// `mcp-<kind>-<YYYYmmdd-HHMMSS>`.
pub fn server_name(kind: InputKind, at: DateTime<Utc>) -> String {
    format!("mcp-{kind}-{}", at.format("%Y%m%d-%H%M%S"))
}

/// Client launch parameters for a remote server at `url`.
pub fn connection_parameters(url: &str) -> ServerParameters {
    ServerParameters {
        command: "npx".to_owned(),
        args: vec!["-y".to_owned(), "mcp-remote".to_owned(), url.to_owned()],
        transport: "streamable-http".to_owned(),
        url: url.to_owned(),
    }
}
