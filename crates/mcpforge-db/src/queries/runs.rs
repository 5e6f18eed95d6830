//! Database query functions for the `generation_runs` table.
//!
//! Each row archives the final state of one workflow run so failed
//! attempts stay inspectable after the process exits.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{GenerationRun, RunOutcome};

/// Fields for archiving a finished run.
#[derive(Debug, Clone)]
pub struct NewGenerationRun<'a> {
    pub id: Uuid,
    pub input_kind: &'a str,
    pub outcome: RunOutcome,
    pub iterations: i32,
    pub production_url: Option<&'a str>,
    pub persisted_id: Option<&'a str>,
    pub error_count: i32,
    pub state: &'a serde_json::Value,
}

/// Insert an archived run. Runs are written once; a second insert with the
/// same id fails.
pub async fn insert_run(pool: &PgPool, new: &NewGenerationRun<'_>) -> Result<GenerationRun> {
    let run = sqlx::query_as::<_, GenerationRun>(
        "INSERT INTO generation_runs \
             (id, input_kind, outcome, iterations, production_url, persisted_id, error_count, state) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         RETURNING *",
    )
    .bind(new.id)
    .bind(new.input_kind)
    .bind(new.outcome)
    .bind(new.iterations)
    .bind(new.production_url)
    .bind(new.persisted_id)
    .bind(new.error_count)
    .bind(new.state)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to archive generation run {}", new.id))?;

    Ok(run)
}

/// Fetch an archived run by ID.
pub async fn get_run(pool: &PgPool, id: Uuid) -> Result<Option<GenerationRun>> {
    let run = sqlx::query_as::<_, GenerationRun>("SELECT * FROM generation_runs WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch generation run")?;

    Ok(run)
}

/// List the most recent runs, newest first.
pub async fn list_recent_runs(pool: &PgPool, limit: i64) -> Result<Vec<GenerationRun>> {
    let runs = sqlx::query_as::<_, GenerationRun>(
        "SELECT * FROM generation_runs ORDER BY created_at DESC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("failed to list generation runs")?;

    Ok(runs)
}

/// Count archived runs by outcome.
pub async fn count_by_outcome(pool: &PgPool, outcome: RunOutcome) -> Result<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM generation_runs WHERE outcome = $1")
            .bind(outcome)
            .fetch_one(pool)
            .await
            .context("failed to count generation runs")?;

    Ok(count)
}
