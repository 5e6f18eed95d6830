//! `mcpforge servers` command: list recorded production servers.

use anyhow::Result;
use sqlx::PgPool;

use mcpforge_db::queries::servers;

pub async fn run_servers(pool: &PgPool, project_id: Option<&str>) -> Result<()> {
    let rows = servers::list_servers(pool, project_id).await?;

    if rows.is_empty() {
        println!("No servers recorded.");
        return Ok(());
    }

    println!(
        "{:<36}  {:<32}  {:<16}  {:<19}  URL",
        "ID", "NAME", "PROJECT", "CREATED"
    );
    for server in &rows {
        println!(
            "{:<36}  {:<32}  {:<16}  {:<19}  {}",
            server.id,
            server.name,
            server.project_id,
            server.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            server.parameters.url,
        );
    }
    Ok(())
}
