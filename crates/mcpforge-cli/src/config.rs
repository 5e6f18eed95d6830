//! Configuration file management for mcpforge.
//!
//! Provides a TOML-based config file at `~/.config/mcpforge/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use mcpforge_core::llm::DEFAULT_MODEL;
use mcpforge_core::orchestrator::DEFAULT_MAX_ITERATIONS;
use mcpforge_db::config::DbConfig;

pub const ENV_ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";
pub const ENV_DEPLOY_URL: &str = "MCPFORGE_DEPLOY_URL";
pub const ENV_DEPLOY_TOKEN: &str = "MCPFORGE_DEPLOY_TOKEN";
pub const ENV_MORPH_API_KEY: &str = "MORPH_API_KEY";
pub const ENV_MAX_ITERATIONS: &str = "MCPFORGE_MAX_ITERATIONS";
pub const ENV_PROJECT_ID: &str = "MCPFORGE_PROJECT_ID";
pub const ENV_SUPABASE_URL: &str = "SUPABASE_URL";
pub const ENV_SUPABASE_KEY: &str = "SUPABASE_KEY";

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub database: DatabaseSection,
    pub llm: LlmSection,
    pub deploy: DeploySection,
    pub refine: RefineSection,
    pub persist: PersistSection,
    pub workflow: WorkflowSection,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub url: String,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            url: DbConfig::DEFAULT_URL.to_owned(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub model: String,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_owned(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploySection {
    /// Base URL of the deployment platform API.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefineBackend {
    #[default]
    Llm,
    Morph,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RefineSection {
    pub backend: RefineBackend,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub morph_api_key: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistBackend {
    #[default]
    Postgres,
    Supabase,
    None,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistSection {
    pub backend: PersistBackend,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supabase_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supabase_key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowSection {
    pub max_iterations: u32,
}

impl Default for WorkflowSection {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the mcpforge config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/mcpforge` or `~/.config/mcpforge`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("mcpforge");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("mcpforge")
}

/// Return the path to the mcpforge config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))
}

/// Serialize and write the config file, creating parent dirs as needed.
/// The file holds API keys, so it is made owner-only on Unix.
pub fn save_config(config: &ConfigFile) -> Result<PathBuf> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(path)
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Values supplied on the command line.
#[derive(Debug, Default, Clone, Copy)]
pub struct CliOverrides<'a> {
    pub database_url: Option<&'a str>,
    pub max_iterations: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmSettings {
    pub api_key: Option<String>,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploySettings {
    pub url: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefineSettings {
    pub backend: RefineBackend,
    pub morph_api_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistSettings {
    pub backend: PersistBackend,
    pub project_id: Option<String>,
    pub supabase_url: Option<String>,
    pub supabase_key: Option<String>,
}

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct McpforgeConfig {
    pub db_config: DbConfig,
    pub llm: LlmSettings,
    pub deploy: DeploySettings,
    pub refine: RefineSettings,
    pub persist: PersistSettings,
    pub max_iterations: u32,
}

impl McpforgeConfig {
    /// Resolve configuration from the process environment and the config file.
    pub fn resolve(cli: CliOverrides<'_>) -> Result<Self> {
        let file = match load_config() {
            Ok(file) => file,
            Err(e) if config_path().exists() => return Err(e),
            Err(_) => ConfigFile::default(),
        };
        Self::resolve_with(cli, &|name| std::env::var(name).ok(), file)
    }

    /// Apply the chain CLI flag > env var > config file > default.
    pub fn resolve_with(
        cli: CliOverrides<'_>,
        lookup: &dyn Fn(&str) -> Option<String>,
        file: ConfigFile,
    ) -> Result<Self> {
        let env = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let db_url = match cli.database_url {
            Some(url) => url.to_owned(),
            None => env(DbConfig::ENV_VAR).unwrap_or(file.database.url),
        };

        let max_iterations = match (cli.max_iterations, env(ENV_MAX_ITERATIONS)) {
            (Some(n), _) => n,
            (None, Some(raw)) => raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_MAX_ITERATIONS} must be an integer, got {raw:?}"))?,
            (None, None) => file.workflow.max_iterations,
        };
        if max_iterations == 0 {
            bail!("max_iterations must be a positive integer");
        }

        Ok(Self {
            db_config: DbConfig::new(db_url),
            llm: LlmSettings {
                api_key: env(ENV_ANTHROPIC_API_KEY).or(file.llm.api_key),
                model: file.llm.model,
            },
            deploy: DeploySettings {
                url: env(ENV_DEPLOY_URL).or(file.deploy.url),
                token: env(ENV_DEPLOY_TOKEN).or(file.deploy.token),
            },
            refine: RefineSettings {
                backend: file.refine.backend,
                morph_api_key: env(ENV_MORPH_API_KEY).or(file.refine.morph_api_key),
            },
            persist: PersistSettings {
                backend: file.persist.backend,
                project_id: env(ENV_PROJECT_ID).or(file.persist.project_id),
                supabase_url: env(ENV_SUPABASE_URL).or(file.persist.supabase_url),
                supabase_key: env(ENV_SUPABASE_KEY).or(file.persist.supabase_key),
            },
            max_iterations,
        })
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
