//! Application configuration loading and validation.
//!
//! Configuration comes from the process environment (optionally seeded from a
//! `.env` file) or from a YAML file with `${VAR}` / `${VAR:-default}`
//! interpolation. Every section has defaults, so an empty environment yields
//! a usable config except for the model API key, which is checked separately
//! by [`ModelConfig::validate`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::mcp_client::discovery::default_candidates;
use crate::mcp_client::retry::RetrySettings;
use crate::mcp_client::session::SessionOptions;

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("failed to parse config: {reason}")]
    Parse { reason: String },

    #[error("missing required setting {var}")]
    MissingApiKey { var: String },

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

// ─── Environment Variable Names ──────────────────────────────────────────────

pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_OPENAI_BASE_URL: &str = "OPENAI_BASE_URL";
pub const ENV_OPENAI_MODEL: &str = "OPENAI_MODEL";
pub const ENV_QWEATHER_API_KEY: &str = "QWEATHER_API_KEY";
pub const ENV_QWEATHER_API_BASE: &str = "QWEATHER_API_BASE";
pub const ENV_WEATHER_SERVER_PATH: &str = "WEATHER_SERVER_PATH";
pub const ENV_MAX_TOOL_ROUNDS: &str = "AGENT_MAX_TOOL_ROUNDS";
pub const ENV_LOG_FILE: &str = "AGENT_LOG_FILE";
pub const ENV_LOG_FORMAT: &str = "AGENT_LOG_FORMAT";

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o";

// ─── Sections ────────────────────────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub model: ModelConfig,
    pub weather: WeatherConfig,
    pub server: ServerConfig,
    pub agent: AgentConfig,
    pub logging: LogConfig,
}

/// OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: None,
            timeout_secs: 60,
            connect_timeout_secs: 10,
        }
    }
}

impl ModelConfig {
    /// Fail unless a non-empty API key is configured.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Ok(()),
            _ => Err(ConfigError::MissingApiKey {
                var: ENV_OPENAI_API_KEY.to_string(),
            }),
        }
    }
}

/// Weather provider settings handed to the tool server.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub api_key: Option<String>,
    pub api_base: Option<String>,
    pub timeout_secs: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: None,
            timeout_secs: 10,
        }
    }
}

impl WeatherConfig {
    /// True when both key and base URL are set (live provider).
    pub fn is_live(&self) -> bool {
        let set = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        set(&self.api_key) && set(&self.api_base)
    }
}

/// Where the tool server lives and how to talk to it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Explicit server target. When set, it is the only candidate.
    pub path: Option<PathBuf>,
    /// Base directory for the default candidate list (default: cwd).
    pub base_dir: Option<PathBuf>,
    pub connect_retry: RetrySettings,
    pub init_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            path: None,
            base_dir: None,
            connect_retry: RetrySettings::new(3, 1000),
            init_timeout_secs: 30,
            request_timeout_secs: 30,
            shutdown_timeout_secs: 5,
        }
    }
}

impl ServerConfig {
    /// Ordered candidate paths for the server target.
    pub fn candidates(&self) -> Vec<PathBuf> {
        if let Some(path) = &self.path {
            return vec![path.clone()];
        }
        let base = self
            .base_dir
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        default_candidates(&base)
    }

    /// Session timeouts plus the provider settings the child needs.
    pub fn session_options(&self, weather: &WeatherConfig) -> SessionOptions {
        let mut env = HashMap::new();
        if let Some(key) = &weather.api_key {
            env.insert(ENV_QWEATHER_API_KEY.to_string(), key.clone());
        }
        if let Some(base) = &weather.api_base {
            env.insert(ENV_QWEATHER_API_BASE.to_string(), base.clone());
        }

        SessionOptions {
            init_timeout: Duration::from_secs(self.init_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout_secs),
            env,
        }
    }
}

/// Conversation loop limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Ceiling on model → tools → model round trips per query.
    pub max_tool_rounds: u32,
    pub tool_retry: RetrySettings,
    /// Tool output longer than this is truncated before entering history.
    pub max_tool_result_chars: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: 5,
            tool_retry: RetrySettings::new(2, 1000),
            max_tool_result_chars: 6000,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Invalid {
                key: ENV_LOG_FORMAT.to_string(),
                reason: format!("expected 'text' or 'json', got '{other}'"),
            }),
        }
    }
}

/// Log sink settings consumed by [`crate::init_tracing`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log file. `None` means the default file in the data directory.
    pub file: Option<PathBuf>,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    pub format: LogFormat,
    /// Rotated files kept alongside the current one.
    pub keep_files: u32,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file: None,
            filter: "weather_agent=info,warn".to_string(),
            format: LogFormat::Text,
            keep_files: 3,
        }
    }
}

impl LogConfig {
    /// The configured file, or `file_name` inside the data directory's `logs/`.
    pub fn file_or(&self, file_name: &str) -> PathBuf {
        self.file
            .clone()
            .unwrap_or_else(|| crate::data_dir().join("logs").join(file_name))
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load from the process environment, after seeding it from `.env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from defaults plus whatever `lookup` returns for each variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(&lookup, true)?;
        Ok(config)
    }

    /// Load a YAML file, interpolating `${VAR}` references from the environment.
    ///
    /// Environment variables fill settings the file leaves unset.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let lookup = |key: &str| std::env::var(key).ok();
        Self::from_yaml_str(&raw, &lookup)
    }

    /// Parse YAML text with the given variable lookup.
    pub fn from_yaml_str(
        raw: &str,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let interpolated = interpolate_vars(raw, lookup);
        let mut config: AppConfig = if interpolated.trim().is_empty() {
            AppConfig::default()
        } else {
            serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::Parse {
                reason: e.to_string(),
            })?
        };
        config.apply_env(lookup, false)?;
        Ok(config)
    }

    /// Apply environment overrides. With `overwrite = false`, only settings
    /// that are still unset are filled.
    fn apply_env(
        &mut self,
        lookup: &dyn Fn(&str) -> Option<String>,
        overwrite: bool,
    ) -> Result<(), ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        fill(&mut self.model.api_key, get(ENV_OPENAI_API_KEY), overwrite);
        fill(&mut self.weather.api_key, get(ENV_QWEATHER_API_KEY), overwrite);
        fill(&mut self.weather.api_base, get(ENV_QWEATHER_API_BASE), overwrite);
        fill(
            &mut self.server.path,
            get(ENV_WEATHER_SERVER_PATH).map(|p| PathBuf::from(expand_tilde(&p))),
            overwrite,
        );
        fill(
            &mut self.logging.file,
            get(ENV_LOG_FILE).map(|p| PathBuf::from(expand_tilde(&p))),
            overwrite,
        );

        if overwrite {
            if let Some(url) = get(ENV_OPENAI_BASE_URL) {
                self.model.base_url = url;
            }
            if let Some(model) = get(ENV_OPENAI_MODEL) {
                self.model.model = model;
            }
            if let Some(rounds) = get(ENV_MAX_TOOL_ROUNDS) {
                self.agent.max_tool_rounds = parse_rounds(&rounds)?;
            }
            if let Some(format) = get(ENV_LOG_FORMAT) {
                self.logging.format = format.parse()?;
            }
        }

        if self.agent.max_tool_rounds == 0 {
            return Err(ConfigError::Invalid {
                key: "agent.max_tool_rounds".into(),
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

fn fill<T>(slot: &mut Option<T>, value: Option<T>, overwrite: bool) {
    if value.is_some() && (overwrite || slot.is_none()) {
        *slot = value;
    }
}

fn parse_rounds(raw: &str) -> Result<u32, ConfigError> {
    raw.trim().parse::<u32>().map_err(|e| ConfigError::Invalid {
        key: ENV_MAX_TOOL_ROUNDS.to_string(),
        reason: format!("'{raw}': {e}"),
    })
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_vars(input: &str, lookup: &dyn Fn(&str) -> Option<String>) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr, lookup));
        } else {
            result.push(ch);
        }
    }

    result
}

/// Resolve a variable expression like `VAR` or `VAR:-default`.
fn resolve_var_expr(expr: &str, lookup: &dyn Fn(&str) -> Option<String>) -> String {
    if let Some(idx) = expr.find(":-") {
        let var_name = &expr[..idx];
        let default = &expr[idx + 2..];
        lookup(var_name).unwrap_or_else(|| expand_tilde(default))
    } else {
        lookup(expr).unwrap_or_default()
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
