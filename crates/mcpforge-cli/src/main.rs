mod config;
mod generate_cmd;
mod runs_cmd;
mod servers_cmd;

use clap::{ArgGroup, Parser, Subcommand};

use mcpforge_db::pool;

use config::{CliOverrides, McpforgeConfig};
use generate_cmd::GenerateOptions;

#[derive(Parser)]
#[command(
    name = "mcpforge",
    about = "Generate, deploy, test and repair MCP servers"
)]
struct Cli {
    /// Database URL (overrides MCPFORGE_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write an mcpforge config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/mcpforge")]
        db_url: String,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Create and migrate the mcpforge database
    DbInit,
    /// Generate an MCP server and drive it to a passing production deployment
    #[command(group(ArgGroup::new("input").required(true).multiple(true).args(["openapi", "description"])))]
    Generate {
        /// URL of an OpenAPI specification
        #[arg(long)]
        openapi: Option<String>,
        /// Natural-language description of the server
        #[arg(long)]
        description: Option<String>,
        /// Project the deployed server is recorded under
        #[arg(long)]
        project_id: Option<String>,
        /// Maximum refinement iterations
        #[arg(long)]
        max_iterations: Option<u32>,
        /// Skip recording the deployed server
        #[arg(long)]
        no_persist: bool,
        /// Do not archive the run in the database
        #[arg(long)]
        no_archive: bool,
    },
    /// List recorded servers
    Servers {
        /// Only servers of this project
        #[arg(long)]
        project_id: Option<String>,
    },
    /// List archived runs, or show one run in full
    Runs {
        /// Run ID to show (omit to list recent runs)
        run_id: Option<String>,
        /// Number of runs to list
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
}

/// Execute the `mcpforge init` command: write config file.
fn cmd_init(db_url: &str, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let mut cfg = config::ConfigFile::default();
    cfg.database.url = db_url.to_owned();
    let path = config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    println!("  workflow.max_iterations = {}", cfg.workflow.max_iterations);
    println!();
    println!("Add llm.api_key and deploy.url (or set ANTHROPIC_API_KEY and MCPFORGE_DEPLOY_URL),");
    println!("then run `mcpforge db-init` to create and migrate the database.");

    Ok(())
}

/// Execute the `mcpforge db-init` command: create database and run migrations.
async fn cmd_db_init(config: &McpforgeConfig) -> anyhow::Result<()> {
    println!("Initializing mcpforge database...");

    if pool::ensure_database_exists(&config.db_config).await? {
        println!("Created database.");
    }
    let db_pool = pool::create_pool(&config.db_config).await?;
    let result = migrate_and_report(&db_pool).await;
    db_pool.close().await;
    result?;

    println!("mcpforge db-init complete.");
    Ok(())
}

async fn migrate_and_report(db_pool: &sqlx::PgPool) -> anyhow::Result<()> {
    pool::run_migrations(db_pool).await?;
    let status = pool::schema_status(db_pool).await?;
    println!(
        "Migrations: {}/{} applied",
        status.applied.len(),
        status.available
    );
    for (version, description) in &status.applied {
        println!("  {version:04} {description}");
    }
    println!("Recorded servers: {}", status.servers);
    println!("Archived runs: {}", status.runs);
    if !status.is_current() {
        anyhow::bail!("database schema is not at the latest migration");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let overrides = CliOverrides {
        database_url: cli.database_url.as_deref(),
        max_iterations: None,
    };

    match cli.command {
        Commands::Init { db_url, force } => {
            cmd_init(&db_url, force)?;
        }
        Commands::DbInit => {
            let resolved = McpforgeConfig::resolve(overrides)?;
            cmd_db_init(&resolved).await?;
        }
        Commands::Generate {
            openapi,
            description,
            project_id,
            max_iterations,
            no_persist,
            no_archive,
        } => {
            let resolved = McpforgeConfig::resolve(CliOverrides {
                max_iterations,
                ..overrides
            })?;
            let options = GenerateOptions {
                openapi,
                description,
                project_id,
                no_persist,
                no_archive,
            };
            if !generate_cmd::run_generate(&resolved, options).await? {
                std::process::exit(1);
            }
        }
        Commands::Servers { project_id } => {
            let resolved = McpforgeConfig::resolve(overrides)?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = servers_cmd::run_servers(&db_pool, project_id.as_deref()).await;
            db_pool.close().await;
            result?;
        }
        Commands::Runs { run_id, limit } => {
            let resolved = McpforgeConfig::resolve(overrides)?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = runs_cmd::run_runs(&db_pool, run_id.as_deref(), limit).await;
            db_pool.close().await;
            result?;
        }
    }

    Ok(())
}
