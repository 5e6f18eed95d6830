//! Connection pooling, database bootstrap and schema status.

use anyhow::{Context, Result, bail};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use tracing::{debug, info};

use crate::config::DbConfig;

/// Migrations embedded at compile time from `crates/mcpforge-db/migrations/`.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

/// Open a pool sized and timed by `config`.
pub async fn create_pool(config: &DbConfig) -> Result<PgPool> {
    connect(config, &config.database_url, config.max_connections).await
}

async fn connect(config: &DbConfig, url: &str, max_connections: u32) -> Result<PgPool> {
    debug!(max_connections, timeout = ?config.acquire_timeout, "connecting to database");
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect(url)
        .await
        .with_context(|| format!("failed to connect to database at {url}"))
}

/// Apply every pending embedded migration.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    MIGRATOR
        .run(pool)
        .await
        .context("failed to run database migrations")?;
    info!(available = MIGRATOR.iter().count(), "migrations applied");
    Ok(())
}

/// Create the configured database through the `postgres` maintenance
/// database unless it already exists. Returns whether it was created.
pub async fn ensure_database_exists(config: &DbConfig) -> Result<bool> {
    let db_name = config
        .database_name()
        .context("could not determine database name from URL")?;
    // CREATE DATABASE takes no bind parameters, so the name is spliced in.
    validate_database_name(db_name)?;

    let maintenance = connect(config, &config.maintenance_url(), 1).await?;
    let result = create_if_missing(&maintenance, db_name).await;
    maintenance.close().await;
    result
}

async fn create_if_missing(maintenance: &PgPool, db_name: &str) -> Result<bool> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
            .bind(db_name)
            .fetch_one(maintenance)
            .await
            .context("failed to query pg_database")?;
    if exists {
        debug!(db = db_name, "database already exists");
        return Ok(false);
    }

    maintenance
        .execute(format!("CREATE DATABASE {db_name}").as_str())
        .await
        .with_context(|| format!("failed to create database {db_name}"))?;
    info!(db = db_name, "database created");
    Ok(true)
}

fn validate_database_name(name: &str) -> Result<()> {
    let valid_start = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !valid_start || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        bail!("database name {name:?} must be a plain identifier ([A-Za-z_][A-Za-z0-9_]*)");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Schema status
// ---------------------------------------------------------------------------

/// What `mcpforge db-init` reports after migrating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaStatus {
    /// `(version, description)` of every successfully applied migration.
    pub applied: Vec<(i64, String)>,
    /// Migrations embedded in this binary.
    pub available: usize,
    pub servers: i64,
    pub runs: i64,
}

impl SchemaStatus {
    pub fn is_current(&self) -> bool {
        self.applied.len() == self.available
    }
}

pub async fn schema_status(pool: &PgPool) -> Result<SchemaStatus> {
    let applied: Vec<(i64, String)> = sqlx::query_as(
        "SELECT version, description FROM _sqlx_migrations WHERE success ORDER BY version",
    )
    .fetch_all(pool)
    .await
    .context("failed to read applied migrations")?;

    let servers: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM mcp_servers")
        .fetch_one(pool)
        .await
        .context("failed to count mcp_servers")?;
    let runs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM generation_runs")
        .fetch_one(pool)
        .await
        .context("failed to count generation_runs")?;

    Ok(SchemaStatus {
        applied,
        available: MIGRATOR.iter().count(),
        servers,
        runs,
    })
}
