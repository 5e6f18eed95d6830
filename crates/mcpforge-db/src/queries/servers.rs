//! Database query functions for the `mcp_servers` table.

use anyhow::{Context, Result};
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use crate::models::{McpServer, ServerParameters};

/// Fields for inserting a new server record.
#[derive(Debug, Clone)]
pub struct NewMcpServer<'a> {
    pub name: &'a str,
    pub project_id: &'a str,
    pub parameters: &'a ServerParameters,
    pub description: Option<&'a str>,
}

/// Insert a new server row. Returns the inserted row with server-generated
/// defaults (id, timestamps).
pub async fn insert_server(pool: &PgPool, new: &NewMcpServer<'_>) -> Result<McpServer> {
    let server = sqlx::query_as::<_, McpServer>(
        "INSERT INTO mcp_servers (name, project_id, parameters, description) \
         VALUES ($1, $2, $3, $4) \
         RETURNING *",
    )
    .bind(new.name)
    .bind(new.project_id)
    .bind(Json(new.parameters))
    .bind(new.description)
    .fetch_one(pool)
    .await
    .context("failed to insert mcp server")?;

    Ok(server)
}

/// Fetch a server by its ID.
pub async fn get_server(pool: &PgPool, id: Uuid) -> Result<Option<McpServer>> {
    let server = sqlx::query_as::<_, McpServer>("SELECT * FROM mcp_servers WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch mcp server")?;

    Ok(server)
}

/// List servers, newest first, optionally filtered to one project.
pub async fn list_servers(pool: &PgPool, project_id: Option<&str>) -> Result<Vec<McpServer>> {
    let servers = match project_id {
        Some(project_id) => {
            sqlx::query_as::<_, McpServer>(
                "SELECT * FROM mcp_servers WHERE project_id = $1 ORDER BY created_at DESC",
            )
            .bind(project_id)
            .fetch_all(pool)
            .await
        }
        None => {
            sqlx::query_as::<_, McpServer>("SELECT * FROM mcp_servers ORDER BY created_at DESC")
                .fetch_all(pool)
                .await
        }
    }
    .context("failed to list mcp servers")?;

    Ok(servers)
}

/// Point an existing server record at a new production URL.
///
/// Rewrites `parameters` and bumps `updated_at`.
pub async fn update_server_parameters(
    pool: &PgPool,
    id: Uuid,
    parameters: &ServerParameters,
) -> Result<McpServer> {
    let server = sqlx::query_as::<_, McpServer>(
        "UPDATE mcp_servers \
         SET parameters = $1, updated_at = now() \
         WHERE id = $2 \
         RETURNING *",
    )
    .bind(Json(parameters))
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("failed to update mcp server parameters")?;

    server.with_context(|| format!("mcp server {id} not found"))
}

/// Delete a server record. Returns `true` if a row was removed.
pub async fn delete_server(pool: &PgPool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM mcp_servers WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .context("failed to delete mcp server")?;

    Ok(result.rows_affected() > 0)
}
