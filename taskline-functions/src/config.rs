//! Configuration system for the `Taskline` functions service.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/taskline-functions/config.toml`)
//! 4. Compiled defaults

use std::path::PathBuf;

use taskline_core::proxy::DEFAULT_CODE_TTL_SECS;

/// Errors that can occur when loading service configuration.
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
    #[error("missing required setting `{0}` (flag, env var, or config file)")]
    Missing(&'static str),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure for the service.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct FunctionsConfigFile {
    server: ServerFileConfig,
    platform: PlatformFileConfig,
    twofa: TwoFaFileConfig,
    mail: MailFileConfig,
}

/// `[server]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    bind_addr: Option<String>,
}

/// `[platform]` section of the config file.
///
/// The API key is deliberately not accepted here; it comes from the
/// environment or the command line only.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct PlatformFileConfig {
    endpoint: Option<String>,
    project_id: Option<String>,
    database_id: Option<String>,
    twofa_collection_id: Option<String>,
}

/// `[twofa]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct TwoFaFileConfig {
    code_ttl_secs: Option<u64>,
}

/// `[mail]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct MailFileConfig {
    relay_url: Option<String>,
    from_address: Option<String>,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for the functions service.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Taskline functions service")]
pub struct FunctionsCliArgs {
    /// Address to bind the service to.
    #[arg(short, long, env = "TASKLINE_FUNCTIONS_ADDR")]
    pub bind: Option<String>,

    /// Path to config file (default: `~/.config/taskline-functions/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Platform API endpoint URL.
    #[arg(long, env = "TASKLINE_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Platform project id.
    #[arg(long, env = "TASKLINE_PROJECT")]
    pub project: Option<String>,

    /// Platform API key with users and documents scopes.
    #[arg(long, env = "TASKLINE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Database holding the 2FA code collection.
    #[arg(long)]
    pub database_id: Option<String>,

    /// Collection the 2FA codes are stored in.
    #[arg(long)]
    pub twofa_collection_id: Option<String>,

    /// Lifetime of an issued 2FA code, in seconds.
    #[arg(long)]
    pub code_ttl_secs: Option<u64>,

    /// HTTP mail relay endpoint the 2FA emails are posted to.
    #[arg(long, env = "TASKLINE_MAIL_RELAY")]
    pub mail_relay_url: Option<String>,

    /// From-address on outgoing mail.
    #[arg(long)]
    pub mail_from: Option<String>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "TASKLINE_FUNCTIONS_LOG")]
    pub log_level: String,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved functions service configuration.
#[derive(Debug, Clone)]
pub struct FunctionsConfig {
    /// Address to bind the server to (e.g., `0.0.0.0:9400`).
    pub bind_addr: String,
    /// Platform API endpoint URL. Required to serve requests.
    pub endpoint: Option<String>,
    /// Platform project id. Required to serve requests.
    pub project_id: Option<String>,
    /// Platform API key. Required to serve requests; never written to a
    /// config file.
    pub api_key: Option<String>,
    /// Database holding the 2FA code collection.
    pub database_id: String,
    /// Collection the 2FA codes are stored in.
    pub twofa_collection_id: String,
    /// Lifetime of an issued 2FA code, in seconds.
    pub code_ttl_secs: u64,
    /// HTTP mail relay endpoint; `None` selects the capturing in-memory
    /// transport (useful for local runs without a mail bridge).
    pub mail_relay_url: Option<String>,
    /// From-address on outgoing mail.
    pub mail_from: String,
    /// Log level filter string.
    pub log_level: String,
}

impl Default for FunctionsConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:9400".to_string(),
            endpoint: None,
            project_id: None,
            api_key: None,
            database_id: "taskline".to_string(),
            twofa_collection_id: "twofa_codes".to_string(),
            code_ttl_secs: DEFAULT_CODE_TTL_SECS,
            mail_relay_url: None,
            mail_from: "no-reply@taskline.dev".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl FunctionsConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// If no `--config` is given, the default path is tried and a missing
    /// file is treated as empty config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed.
    pub fn load(cli: &FunctionsCliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Resolve a `FunctionsConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    #[must_use]
    fn resolve(cli: &FunctionsCliArgs, file: &FunctionsConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            bind_addr: cli
                .bind
                .clone()
                .or_else(|| file.server.bind_addr.clone())
                .unwrap_or(defaults.bind_addr),
            endpoint: cli.endpoint.clone().or_else(|| file.platform.endpoint.clone()),
            project_id: cli
                .project
                .clone()
                .or_else(|| file.platform.project_id.clone()),
            api_key: cli.api_key.clone(),
            database_id: cli
                .database_id
                .clone()
                .or_else(|| file.platform.database_id.clone())
                .unwrap_or(defaults.database_id),
            twofa_collection_id: cli
                .twofa_collection_id
                .clone()
                .or_else(|| file.platform.twofa_collection_id.clone())
                .unwrap_or(defaults.twofa_collection_id),
            code_ttl_secs: cli
                .code_ttl_secs
                .or(file.twofa.code_ttl_secs)
                .unwrap_or(defaults.code_ttl_secs),
            mail_relay_url: cli
                .mail_relay_url
                .clone()
                .or_else(|| file.mail.relay_url.clone()),
            mail_from: cli
                .mail_from
                .clone()
                .or_else(|| file.mail.from_address.clone())
                .unwrap_or(defaults.mail_from),
            log_level: cli.log_level.clone(),
        }
    }

    /// The platform endpoint, or an error naming the missing setting.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] when no endpoint was configured.
    pub fn require_endpoint(&self) -> Result<&str, ConfigError> {
        self.endpoint
            .as_deref()
            .ok_or(ConfigError::Missing("endpoint"))
    }

    /// The platform project id, or an error naming the missing setting.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] when no project id was configured.
    pub fn require_project(&self) -> Result<&str, ConfigError> {
        self.project_id
            .as_deref()
            .ok_or(ConfigError::Missing("project"))
    }

    /// The platform API key, or an error naming the missing setting.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] when no API key was configured.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .ok_or(ConfigError::Missing("api-key"))
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file for the service.
fn load_config_file(
    explicit_path: Option<&std::path::Path>,
) -> Result<FunctionsConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(FunctionsConfigFile::default());
        };
        config_dir.join("taskline-functions").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FunctionsConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
