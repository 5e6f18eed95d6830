//! `mcpforge generate` command: run one generation workflow end to end.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use mcpforge_core::classify::RawInput;
use mcpforge_core::deployer::{HttpDeployer, HttpDeployerConfig};
use mcpforge_core::generator::{
    DescriptionGenerator, Generator, OpenApiGenerator, OpenApiGeneratorConfig, RoutingGenerator,
};
use mcpforge_core::harness::{HarnessConfig, ProtocolHarness};
use mcpforge_core::llm::{AnthropicClient, AnthropicConfig, CompletionBackend};
use mcpforge_core::orchestrator::{
    Adapters, Orchestrator, OrchestratorConfig, RunSummary, WorkflowRequest,
};
use mcpforge_core::persist::{PgPersister, Persister, SupabaseConfig, SupabasePersister};
use mcpforge_core::refiner::{LlmRefiner, MorphConfig, MorphRefiner, Refiner};
use mcpforge_core::state::{DeploymentStage, GenerationState, TerminalOutcome};
use mcpforge_db::config::DbConfig;
use mcpforge_db::models::RunOutcome;
use mcpforge_db::pool;
use mcpforge_db::queries::runs::{self, NewGenerationRun};

use crate::config::{
    ENV_ANTHROPIC_API_KEY, ENV_DEPLOY_URL, ENV_MORPH_API_KEY, McpforgeConfig, PersistBackend,
    RefineBackend,
};

const ARCHIVE_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Options for one `generate` invocation.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub openapi: Option<String>,
    pub description: Option<String>,
    pub project_id: Option<String>,
    pub no_persist: bool,
    pub no_archive: bool,
}

/// Run the generate command. Returns whether the run succeeded.
pub async fn run_generate(config: &McpforgeConfig, options: GenerateOptions) -> Result<bool> {
    let persists_to_db =
        !options.no_persist && config.persist.backend == PersistBackend::Postgres;
    let db_pool = if persists_to_db {
        Some(pool::create_pool(&config.db_config).await?)
    } else if !options.no_archive {
        // Only the archive needs the database; losing it costs the archive, not the run.
        let archive_db = DbConfig {
            max_connections: 1,
            acquire_timeout: ARCHIVE_CONNECT_TIMEOUT,
            ..config.db_config.clone()
        };
        match pool::create_pool(&archive_db).await {
            Ok(p) => Some(p),
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "database unavailable; run will not be archived");
                None
            }
        }
    } else {
        None
    };

    let result = generate(config, options, db_pool.as_ref()).await;
    if let Some(p) = db_pool {
        p.close().await;
    }
    result
}

async fn generate(
    config: &McpforgeConfig,
    options: GenerateOptions,
    db_pool: Option<&PgPool>,
) -> Result<bool> {
    let adapters = build_adapters(config, &options, db_pool)?;
    let orchestrator = Orchestrator::new(
        OrchestratorConfig {
            max_iterations: config.max_iterations,
            ..OrchestratorConfig::default()
        },
        adapters,
    )?;

    // First signal cancels the run, second force-exits.
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    let got_first_signal = Arc::new(AtomicBool::new(false));
    let got_first_clone = Arc::clone(&got_first_signal);
    tokio::spawn(async move {
        loop {
            tokio::signal::ctrl_c().await.ok();
            if got_first_clone.swap(true, Ordering::SeqCst) {
                eprintln!("\nForce exit.");
                std::process::exit(130);
            }
            eprintln!("\nCancelling run (Ctrl+C again to force)...");
            cancel_clone.cancel();
        }
    });

    let request = WorkflowRequest {
        input: RawInput {
            openapi_url: options.openapi.clone(),
            description: options.description.clone(),
        },
        project_id: options
            .project_id
            .clone()
            .or_else(|| config.persist.project_id.clone()),
    };
    let state = orchestrator.run(request, cancel).await;

    if let (Some(p), false) = (db_pool, options.no_archive) {
        if let Err(e) = archive(p, &state).await {
            tracing::warn!(run_id = %state.run_id(), error = %format!("{e:#}"), "failed to archive run");
        }
    }

    println!();
    print!("{}", RunSummary::from(&state));
    Ok(state.terminal_outcome() == TerminalOutcome::Success)
}

fn build_adapters(
    config: &McpforgeConfig,
    options: &GenerateOptions,
    db_pool: Option<&PgPool>,
) -> Result<Adapters> {
    let llm: Option<Arc<dyn CompletionBackend>> = match &config.llm.api_key {
        Some(key) => {
            let client = AnthropicClient::new(AnthropicConfig {
                model: config.llm.model.clone(),
                ..AnthropicConfig::new(key.clone())
            })?;
            Some(Arc::new(client))
        }
        None => None,
    };

    let spec_generator = Arc::new(OpenApiGenerator::new(OpenApiGeneratorConfig::default()));
    let generator: Arc<dyn Generator> = match &llm {
        Some(backend) => Arc::new(RoutingGenerator::new(
            spec_generator,
            Arc::new(DescriptionGenerator::new(backend.clone())),
        )),
        None if options.description.is_none() => spec_generator,
        None => bail!(
            "generating from a description needs an Anthropic API key; set {ENV_ANTHROPIC_API_KEY} or llm.api_key"
        ),
    };

    let refiner: Arc<dyn Refiner> = match config.refine.backend {
        RefineBackend::Llm => {
            let backend = llm.clone().with_context(|| {
                format!("the llm refiner needs an Anthropic API key; set {ENV_ANTHROPIC_API_KEY} or llm.api_key")
            })?;
            Arc::new(LlmRefiner::new(backend))
        }
        RefineBackend::Morph => {
            let key = config.refine.morph_api_key.clone().with_context(|| {
                format!("the morph refiner needs an API key; set {ENV_MORPH_API_KEY} or refine.morph_api_key")
            })?;
            Arc::new(MorphRefiner::new(MorphConfig::new(key))?)
        }
    };

    let deploy_url = config.deploy.url.clone().with_context(|| {
        format!("no deployment platform configured; set {ENV_DEPLOY_URL} or deploy.url")
    })?;
    let deployer = HttpDeployer::new(HttpDeployerConfig {
        token: config.deploy.token.clone(),
        ..HttpDeployerConfig::new(deploy_url)
    })?;

    let harness = ProtocolHarness::http(HarnessConfig::default())?;

    let persister: Option<Arc<dyn Persister>> = if options.no_persist {
        None
    } else {
        match config.persist.backend {
            PersistBackend::None => None,
            PersistBackend::Postgres => {
                let p = db_pool.context("postgres persistence needs a database connection")?;
                Some(Arc::new(PgPersister::new(p.clone())))
            }
            PersistBackend::Supabase => {
                let (Some(url), Some(key)) =
                    (&config.persist.supabase_url, &config.persist.supabase_key)
                else {
                    bail!("supabase persistence needs persist.supabase_url and persist.supabase_key");
                };
                Some(Arc::new(SupabasePersister::new(SupabaseConfig::new(
                    url.clone(),
                    key.clone(),
                ))?))
            }
        }
    };

    Ok(Adapters {
        generator,
        deployer: Arc::new(deployer),
        harness: Arc::new(harness),
        refiner,
        persister,
    })
}

/// Store the final state in `generation_runs`.
async fn archive(pool: &PgPool, state: &GenerationState) -> Result<()> {
    let snapshot = serde_json::to_value(state).context("failed to serialize run state")?;
    let input_kind = state
        .input_kind()
        .map_or_else(|| "unknown".to_owned(), |k| k.to_string());
    let run = runs::insert_run(
        pool,
        &NewGenerationRun {
            id: state.run_id(),
            input_kind: &input_kind,
            outcome: run_outcome(state.terminal_outcome()),
            iterations: i32::try_from(state.current_iteration()).unwrap_or(i32::MAX),
            production_url: production_url(state),
            persisted_id: state.persisted_id(),
            error_count: i32::try_from(state.errors().len()).unwrap_or(i32::MAX),
            state: &snapshot,
        },
    )
    .await?;
    tracing::debug!(run_id = %run.id, "run archived");
    Ok(())
}

fn run_outcome(outcome: TerminalOutcome) -> RunOutcome {
    match outcome {
        TerminalOutcome::Pending => RunOutcome::Pending,
        TerminalOutcome::Success => RunOutcome::Success,
        TerminalOutcome::Failed => RunOutcome::Failed,
    }
}

/// The deployment URL, only once it points at production.
fn production_url(state: &GenerationState) -> Option<&str> {
    match state.deployment_stage() {
        DeploymentStage::Production => state.deployment_url(),
        _ => None,
    }
}
