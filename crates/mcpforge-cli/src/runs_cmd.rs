//! `mcpforge runs` command: inspect archived generation runs.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use mcpforge_db::queries::runs;

/// With `run_id`, print that run's full state; otherwise list recent runs.
pub async fn run_runs(pool: &PgPool, run_id: Option<&str>, limit: i64) -> Result<()> {
    match run_id {
        Some(id) => show_run(pool, id).await,
        None => list_runs(pool, limit).await,
    }
}

async fn list_runs(pool: &PgPool, limit: i64) -> Result<()> {
    let rows = runs::list_recent_runs(pool, limit).await?;

    if rows.is_empty() {
        println!("No runs archived.");
        return Ok(());
    }

    println!(
        "{:<36}  {:<11}  {:<8}  {:>5}  {:>6}  {:<19}  PRODUCTION URL",
        "ID", "INPUT", "OUTCOME", "ITERS", "ERRORS", "CREATED"
    );
    for run in &rows {
        println!(
            "{:<36}  {:<11}  {:<8}  {:>5}  {:>6}  {:<19}  {}",
            run.id,
            run.input_kind,
            run.outcome.to_string(),
            run.iterations,
            run.error_count,
            run.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            run.production_url.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

async fn show_run(pool: &PgPool, id_str: &str) -> Result<()> {
    let id = Uuid::parse_str(id_str).with_context(|| format!("invalid run ID: {id_str}"))?;
    let run = runs::get_run(pool, id)
        .await?
        .with_context(|| format!("run {id} not found"))?;

    println!("Run: {}", run.id);
    println!("Outcome: {}", run.outcome);
    println!("Input: {}", run.input_kind);
    println!("Iterations: {}", run.iterations);
    if let Some(url) = &run.production_url {
        println!("Production URL: {url}");
    }
    if let Some(record) = &run.persisted_id {
        println!("Record: {record}");
    }
    println!("Created: {}", run.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&run.state).context("failed to render run state")?
    );
    Ok(())
}
