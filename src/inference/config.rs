//! Relay configuration loading.
//!
//! Precedence, lowest to highest: hard-coded defaults, an optional
//! `chat-relay.yaml`, then environment variables. The YAML file supports
//! `${VAR}` / `${VAR:-default}` interpolation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use super::errors::RelayError;

// ─── Defaults ────────────────────────────────────────────────────────────────

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:11434";
pub const DEFAULT_MODEL: &str = "deepseek-coder:latest";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 1200;
pub const DEFAULT_LISTING_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:7860";
pub const DEFAULT_SESSION_IDLE_TIMEOUT_SECS: u64 = 3600;

/// File name searched for when `CHAT_RELAY_CONFIG` is not set.
pub const CONFIG_FILE_NAME: &str = "chat-relay.yaml";

// ─── Public Types ────────────────────────────────────────────────────────────

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Base URL of the Ollama server, without trailing slash.
    pub base_url: String,
    /// Model promoted to the top of every model list. `None` disables the
    /// synthetic default, so an empty registry yields the sentinel entry.
    pub default_model: Option<String>,
    /// Upper bound on a single chat call.
    pub request_timeout_secs: u64,
    /// Upper bound on a model listing call.
    pub listing_timeout_secs: u64,
    /// Address the HTTP front end listens on.
    pub bind_address: String,
    /// Connections untouched for this long are dropped. Must exceed
    /// `request_timeout_secs`.
    pub session_idle_timeout_secs: u64,
    /// System prompt given to new connections.
    pub system_prompt: Option<String>,
    /// Log to this file instead of stderr.
    pub log_file: Option<PathBuf>,
    pub log_format: LogFormat,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            default_model: Some(DEFAULT_MODEL.to_string()),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            listing_timeout_secs: DEFAULT_LISTING_TIMEOUT_SECS,
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            session_idle_timeout_secs: DEFAULT_SESSION_IDLE_TIMEOUT_SECS,
            system_prompt: None,
            log_file: None,
            log_format: LogFormat::Text,
        }
    }
}

impl RelayConfig {
    /// Load the configuration from the environment and, if one is found,
    /// the YAML config file.
    pub fn load() -> Result<Self, RelayError> {
        let cwd = std::env::current_dir().unwrap_or_default();
        let mut config = match find_config_path(&cwd) {
            Some(path) => load_config_file(&path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.normalize()?;
        Ok(config)
    }

    /// Apply environment overrides. Empty values count as unset.
    ///
    /// Takes a lookup function so callers (and tests) decide where values
    /// come from.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), RelayError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("OLLAMA_HOST") {
            self.base_url = v;
        }
        if let Some(v) = get("OLLAMA_MODEL") {
            self.default_model = Some(v);
        }
        if let Some(v) = get("OLLAMA_REQUEST_TIMEOUT") {
            self.request_timeout_secs = parse_secs("OLLAMA_REQUEST_TIMEOUT", &v)?;
        }
        if let Some(v) = get("OLLAMA_LISTING_TIMEOUT") {
            self.listing_timeout_secs = parse_secs("OLLAMA_LISTING_TIMEOUT", &v)?;
        }
        if let Some(v) = get("CHAT_RELAY_BIND") {
            self.bind_address = v;
        }
        if let Some(v) = get("CHAT_RELAY_SESSION_IDLE_TIMEOUT") {
            self.session_idle_timeout_secs = parse_secs("CHAT_RELAY_SESSION_IDLE_TIMEOUT", &v)?;
        }
        if let Some(v) = get("CHAT_RELAY_SYSTEM_PROMPT") {
            self.system_prompt = Some(v);
        }
        if let Some(v) = get("CHAT_RELAY_LOG_FILE") {
            self.log_file = Some(PathBuf::from(expand_tilde(&v)));
        }
        if let Some(v) = get("CHAT_RELAY_LOG_FORMAT") {
            self.log_format = match v.to_ascii_lowercase().as_str() {
                "text" => LogFormat::Text,
                "json" => LogFormat::Json,
                other => {
                    return Err(RelayError::Config {
                        reason: format!("CHAT_RELAY_LOG_FORMAT must be 'text' or 'json', got '{other}'"),
                    })
                }
            };
        }
        Ok(())
    }

    /// Canonicalize values and reject ones the relay cannot run with.
    pub fn normalize(&mut self) -> Result<(), RelayError> {
        let trimmed = self.base_url.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(RelayError::Config {
                reason: "base_url must not be empty".into(),
            });
        }
        self.base_url = trimmed.to_string();

        if self
            .default_model
            .as_deref()
            .is_some_and(|m| m.trim().is_empty())
        {
            self.default_model = None;
        }
        if self
            .system_prompt
            .as_deref()
            .is_some_and(|p| p.trim().is_empty())
        {
            self.system_prompt = None;
        }

        if self.request_timeout_secs == 0 || self.listing_timeout_secs == 0 {
            return Err(RelayError::Config {
                reason: "timeouts must be at least one second".into(),
            });
        }
        if self.session_idle_timeout_secs <= self.request_timeout_secs {
            return Err(RelayError::Config {
                reason: format!(
                    "session_idle_timeout_secs ({}) must exceed request_timeout_secs ({})",
                    self.session_idle_timeout_secs, self.request_timeout_secs
                ),
            });
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn listing_timeout(&self) -> Duration {
        Duration::from_secs(self.listing_timeout_secs)
    }

    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_timeout_secs)
    }
}

fn parse_secs(key: &str, value: &str) -> Result<u64, RelayError> {
    value.trim().parse::<u64>().map_err(|e| RelayError::Config {
        reason: format!("{key} must be a whole number of seconds, got '{value}': {e}"),
    })
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Locate the config file.
///
/// `CHAT_RELAY_CONFIG` wins if it points at an existing file; otherwise walk
/// upward from `start` looking for `chat-relay.yaml`.
pub fn find_config_path(start: &Path) -> Option<PathBuf> {
    if let Ok(explicit) = std::env::var("CHAT_RELAY_CONFIG") {
        let candidate = PathBuf::from(expand_tilde(&explicit));
        if candidate.is_file() {
            return Some(candidate);
        }
        tracing::warn!(path = %candidate.display(), "CHAT_RELAY_CONFIG does not point at a file");
    }

    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}

/// Read and parse a YAML config file, interpolating environment variables.
pub fn load_config_file(path: &Path) -> Result<RelayConfig, RelayError> {
    let raw = std::fs::read_to_string(path).map_err(|e| RelayError::Config {
        reason: format!("failed to read {}: {e}", path.display()),
    })?;

    let interpolated = interpolate_env_vars(&raw);

    let mut config: RelayConfig =
        serde_yaml::from_str(&interpolated).map_err(|e| RelayError::Config {
            reason: format!("failed to parse {}: {e}", path.display()),
        })?;

    if let Some(log_file) = config.log_file.take() {
        config.log_file = Some(PathBuf::from(expand_tilde(&log_file.to_string_lossy())));
    }

    tracing::debug!(path = %path.display(), "loaded config file");
    Ok(config)
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

/// Resolve a variable expression like `VAR` or `VAR:-default`.
fn resolve_var_expr(expr: &str) -> String {
    if let Some((var_name, default)) = expr.split_once(":-") {
        std::env::var(var_name).unwrap_or_else(|_| expand_tilde(default))
    } else {
        std::env::var(expr).unwrap_or_default()
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
