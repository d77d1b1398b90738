//! Configuration system for the Taskline client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/taskline/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error. Settings without a
//! sensible default (endpoint, project id) stay `None` until a command
//! that needs them asks via the `require_*` accessors.

use std::path::PathBuf;
use std::time::Duration;

/// Errors that can occur when loading or querying configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// A setting with no default was needed but not provided.
    #[error("missing required setting `{0}` (set it via CLI flag, env, or config file)")]
    MissingSetting(&'static str),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    backend: BackendFileConfig,
    sync: SyncFileConfig,
    notify: NotifyFileConfig,
    cache: CacheFileConfig,
}

/// `[backend]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct BackendFileConfig {
    endpoint: Option<String>,
    project_id: Option<String>,
    database_id: Option<String>,
    tasks_collection_id: Option<String>,
    functions_url: Option<String>,
    verify_url: Option<String>,
}

/// `[sync]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SyncFileConfig {
    page_size: Option<usize>,
}

/// `[notify]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct NotifyFileConfig {
    interval_secs: Option<u64>,
}

/// `[cache]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct CacheFileConfig {
    dir: Option<String>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -- Backend --
    /// Platform REST endpoint, e.g. `https://cloud.example.com/v1`.
    pub endpoint: Option<String>,
    /// Platform project id.
    pub project_id: Option<String>,
    /// Database holding the task collection.
    pub database_id: String,
    /// Collection holding task documents.
    pub tasks_collection_id: String,
    /// Base URL of the functions service.
    pub functions_url: Option<String>,
    /// Redirect target embedded in verification emails.
    pub verify_url: Option<String>,

    // -- Sync --
    /// Number of tasks in the recent view.
    pub page_size: usize,

    // -- Notify --
    /// Interval between deadline scans in watch mode.
    pub notify_interval: Duration,

    // -- Cache --
    /// Directory for the users cache and saved session.
    /// `None` when no data directory could be determined: persistence
    /// is skipped and resolution falls through to placeholders.
    pub cache_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            project_id: None,
            database_id: "taskline".to_string(),
            tasks_collection_id: "tasks".to_string(),
            functions_url: None,
            verify_url: None,
            page_size: 10,
            notify_interval: Duration::from_secs(3600),
            cache_dir: default_cache_dir(),
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// CLI args and env vars are parsed via `clap`. If `--config` is given
    /// and the file does not exist, returns an error. If no `--config` is
    /// given, the default path (`~/.config/taskline/config.toml`) is tried
    /// and silently ignored if missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default. This is separated from `load()` to
    /// enable unit testing without CLI parsing.
    #[must_use]
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            endpoint: cli
                .endpoint
                .clone()
                .or_else(|| file.backend.endpoint.clone()),
            project_id: cli
                .project
                .clone()
                .or_else(|| file.backend.project_id.clone()),
            database_id: file
                .backend
                .database_id
                .clone()
                .unwrap_or(defaults.database_id),
            tasks_collection_id: file
                .backend
                .tasks_collection_id
                .clone()
                .unwrap_or(defaults.tasks_collection_id),
            functions_url: cli
                .functions_url
                .clone()
                .or_else(|| file.backend.functions_url.clone()),
            verify_url: file.backend.verify_url.clone(),
            page_size: file.sync.page_size.unwrap_or(defaults.page_size),
            notify_interval: file
                .notify
                .interval_secs
                .map_or(defaults.notify_interval, Duration::from_secs),
            cache_dir: cli
                .cache_dir
                .clone()
                .or_else(|| file.cache.dir.clone().map(PathBuf::from))
                .or(defaults.cache_dir),
        }
    }

    /// Platform endpoint, required by every command that talks to the
    /// backend.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingSetting`] when not configured.
    pub fn require_endpoint(&self) -> Result<&str, ConfigError> {
        self.endpoint
            .as_deref()
            .ok_or(ConfigError::MissingSetting("backend.endpoint"))
    }

    /// Project id, required by every command that talks to the backend.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingSetting`] when not configured.
    pub fn require_project(&self) -> Result<&str, ConfigError> {
        self.project_id
            .as_deref()
            .ok_or(ConfigError::MissingSetting("backend.project_id"))
    }

    /// Functions service base URL, required by the 2FA and directory calls.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingSetting`] when not configured.
    pub fn require_functions_url(&self) -> Result<&str, ConfigError> {
        self.functions_url
            .as_deref()
            .ok_or(ConfigError::MissingSetting("backend.functions_url"))
    }

    /// Path of the persisted users cache, when a cache dir exists.
    #[must_use]
    pub fn users_cache_path(&self) -> Option<PathBuf> {
        self.cache_dir.as_ref().map(|dir| dir.join("users.json"))
    }

    /// Path of the saved session, when a cache dir exists.
    #[must_use]
    pub fn session_path(&self) -> Option<PathBuf> {
        self.cache_dir.as_ref().map(|dir| dir.join("session.json"))
    }
}

/// CLI arguments parsed by clap.
///
/// The backend coordinates can also come from environment variables so
/// scripts don't have to pass flags on every invocation.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Task tracker with live sync and deadline alerts")]
pub struct CliArgs {
    /// Platform REST endpoint, e.g. `https://cloud.example.com/v1`.
    #[arg(long, env = "TASKLINE_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Platform project id.
    #[arg(long, env = "TASKLINE_PROJECT")]
    pub project: Option<String>,

    /// Base URL of the functions service.
    #[arg(long, env = "TASKLINE_FUNCTIONS_URL")]
    pub functions_url: Option<String>,

    /// Path to config file (default: `~/.config/taskline/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory for the users cache and saved session.
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "TASKLINE_LOG")]
    pub log_level: String,

    /// Path to log file (watch mode tees logs there).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn default_cache_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("taskline"))
}

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            // No config dir available; use defaults.
            return Ok(ConfigFile::default());
        };
        config_dir.join("taskline").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
