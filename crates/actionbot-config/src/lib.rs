use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON5 parse error: {0}")]
    Json5(#[from] json5::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config directory not found")]
    NoDirFound,
}

/// HTTP server configuration (cron trigger + health).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Bearer secret the external scheduler must present on `/api/cron`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron_secret: Option<String>,
    /// Wall-clock ceiling for one cron request.
    #[serde(default = "default_handler_timeout")]
    pub handler_timeout_secs: u64,
}

fn default_port() -> u16 {
    3000
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_handler_timeout() -> u64 {
    300
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            cron_secret: None,
            handler_timeout_secs: default_handler_timeout(),
        }
    }
}

/// OpenAI-compatible model endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Model used for the tool-calling loop and argument repair.
    #[serde(default = "default_model")]
    pub model: String,
    /// Model used for tool classification. Falls back to `model`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orchestrator_model: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_request_timeout() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            model: default_model(),
            orchestrator_model: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl LlmConfig {
    pub fn orchestrator_model(&self) -> &str {
        self.orchestrator_model.as_deref().unwrap_or(&self.model)
    }
}

/// Scheduling and failure-policy knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Interval of the in-process scheduler loop.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    /// Upper bound on model round-trips per run.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// A previously healthy action is paused once its last success is older than this.
    #[serde(default = "default_failure_grace_hours")]
    pub failure_grace_hours: i64,
    /// A never-successful action is paused after this many processed runs.
    #[serde(default = "default_never_succeeded_threshold")]
    pub never_succeeded_threshold: i64,
}

fn default_tick_interval() -> u64 {
    60
}

fn default_max_steps() -> usize {
    15
}

fn default_failure_grace_hours() -> i64 {
    24
}

fn default_never_succeeded_threshold() -> i64 {
    3
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            max_steps: default_max_steps(),
            failure_grace_hours: default_failure_grace_hours(),
            never_succeeded_threshold: default_never_succeeded_threshold(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database path. Defaults to `~/.actionbot/actionbot.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Price API queried by the `token_price` tool.
    #[serde(default = "default_price_api_url")]
    pub price_api_url: String,
}

fn default_price_api_url() -> String {
    "https://api.jup.ag/price/v2".to_string()
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            price_api_url: default_price_api_url(),
        }
    }
}

/// Top-level actionbot configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionBotConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

impl ActionBotConfig {
    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(secret) = non_empty("ACTIONBOT_CRON_SECRET").or_else(|| non_empty("CRON_SECRET")) {
            self.server.cron_secret = Some(secret);
        }
        if let Some(key) = non_empty("OPENAI_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(url) = non_empty("OPENAI_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Some(model) = non_empty("ACTIONBOT_MODEL") {
            self.llm.model = model;
        }
    }

    /// Resolved database path (config value or default under the config dir).
    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.storage.database_path {
            Some(p) => Ok(p.clone()),
            None => Ok(config_dir()?.join("actionbot.db")),
        }
    }
}

/// Resolve the actionbot config directory (~/.actionbot/).
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|h| h.join(".actionbot"))
        .ok_or(ConfigError::NoDirFound)
}

/// Resolve the config file path (~/.actionbot/config.json5).
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.json5"))
}

/// Load configuration from the default path, falling back to defaults.
pub fn load_config() -> Result<ActionBotConfig, ConfigError> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let path = config_file_path()?;
    let mut config = load_config_from(&path)?;
    config.apply_env_overrides();
    Ok(config)
}

/// Load configuration from a specific path, falling back to defaults if not found.
///
/// Files ending in `.toml` are parsed as TOML, everything else as JSON5.
pub fn load_config_from(path: &Path) -> Result<ActionBotConfig, ConfigError> {
    if !path.exists() {
        tracing::debug!("Config file not found at {}, using defaults", path.display());
        return Ok(ActionBotConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => toml::from_str(&content)?,
        _ => json5::from_str(&content)?,
    };
    Ok(config)
}

/// Ensure the config directory exists.
pub fn ensure_config_dir() -> Result<PathBuf, ConfigError> {
    let dir = config_dir()?;
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
    }
    Ok(dir)
}

/// Save configuration to the default path.
pub fn save_config(config: &ActionBotConfig) -> Result<(), ConfigError> {
    let dir = ensure_config_dir()?;
    save_config_to(config, &dir.join("config.json5"))
}

/// Save configuration to a specific path (JSON is valid JSON5).
pub fn save_config_to(config: &ActionBotConfig, path: &Path) -> Result<(), ConfigError> {
    let content = serde_json::to_string_pretty(config)
        .map_err(|e| ConfigError::Io(std::io::Error::other(e)))?;
    std::fs::write(path, content)?;
    Ok(())
}
