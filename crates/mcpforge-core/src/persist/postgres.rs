//! Persist into the local `mcp_servers` table.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::info;

use mcpforge_db::queries::servers::{self, NewMcpServer};

use super::{PersistRequest, Persister, connection_parameters};
use crate::error::PersistenceError;

pub struct PgPersister {
    pool: PgPool,
}

impl PgPersister {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Persister for PgPersister {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn persist(&self, request: &PersistRequest<'_>) -> Result<String, PersistenceError> {
        let parameters = connection_parameters(request.url);
        let server = servers::insert_server(
            &self.pool,
            &NewMcpServer {
                name: request.name,
                project_id: request.project_id,
                parameters: &parameters,
                description: request.description,
            },
        )
        .await
        .map_err(|e| PersistenceError::Backend(format!("{e:#}")))?;

        info!(server_id = %server.id, name = %server.name, "recorded mcp server");
        Ok(server.id.to_string())
    }
}
