//! Explicit configuration.
//!
//! Configuration is a plain value handed to constructors. Nothing in the
//! library reads the process environment on its own; callers that want
//! environment overrides pass the variables in through
//! [`StagechainConfig::with_env_overrides`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::errors::ConfigError;
use crate::pipeline::{BackoffStrategy, ContextMode, RetryPolicy};

/// Settings for an OpenAI-compatible chat completion endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API base URL, without the `/chat/completions` suffix.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer token. Never serialized.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Default model, in `provider/model` or bare `model` form.
    #[serde(default = "default_model")]
    pub model: String,
    /// HTTP request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub timeout_seconds: f64,
    /// Sampling temperature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Completion token cap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Extra headers sent with every request.
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "openai/gpt-4o".to_string()
}

fn default_request_timeout() -> f64 {
    60.0
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            model: default_model(),
            timeout_seconds: default_request_timeout(),
            temperature: None,
            max_tokens: None,
            headers: HashMap::new(),
        }
    }
}

impl ProviderConfig {
    /// Creates a provider config with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base URL.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the default model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Gets the request timeout as a `Duration`.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        seconds_to_duration(self.timeout_seconds)
    }

    /// The model name to put on the wire.
    ///
    /// `openai/gpt-4o` becomes `gpt-4o`; an identity override wins over the
    /// configured default.
    #[must_use]
    pub fn request_model<'a>(&'a self, override_model: Option<&'a str>) -> &'a str {
        let model = override_model.unwrap_or(&self.model);
        model.split_once('/').map_or(model, |(_, name)| name)
    }

    /// The chat completions endpoint.
    #[must_use]
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// How the executor runs stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// What later stages see as `{context}`.
    #[serde(default)]
    pub context_mode: ContextMode,
    /// Separator between outputs in `full_history` mode.
    #[serde(default = "default_separator")]
    pub history_separator: String,
    /// Per-stage invocation timeout; a timeout fails the stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_timeout_seconds: Option<f64>,
}

fn default_separator() -> String {
    "\n\n".to_string()
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            context_mode: ContextMode::default(),
            history_separator: default_separator(),
            stage_timeout_seconds: None,
        }
    }
}

impl ExecutorConfig {
    /// Creates an executor config with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the context mode.
    #[must_use]
    pub fn with_context_mode(mut self, mode: ContextMode) -> Self {
        self.context_mode = mode;
        self
    }

    /// Sets the history separator.
    #[must_use]
    pub fn with_history_separator(mut self, separator: impl Into<String>) -> Self {
        self.history_separator = separator.into();
        self
    }

    /// Sets the per-stage timeout.
    #[must_use]
    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout_seconds = Some(timeout.as_secs_f64());
        self
    }

    /// Gets the per-stage timeout as a `Duration`.
    #[must_use]
    pub fn stage_timeout(&self) -> Option<Duration> {
        self.stage_timeout_seconds.map(seconds_to_duration)
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive (e.g. `info`, `stagechain=debug`).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Top-level configuration object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StagechainConfig {
    /// Model provider settings.
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Executor settings.
    #[serde(default)]
    pub executor: ExecutorConfig,
    /// Whole-run retry policy.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl StagechainConfig {
    /// Parses a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Applies overrides from an explicit set of environment variables.
    ///
    /// Recognised keys: `STAGECHAIN_BASE_URL`, `STAGECHAIN_MODEL`,
    /// `STAGECHAIN_API_KEY` (falls back to `OPENAI_API_KEY`),
    /// `STAGECHAIN_TIMEOUT_SECONDS`, `STAGECHAIN_CONTEXT_MODE`,
    /// `STAGECHAIN_STAGE_TIMEOUT_SECONDS`, `STAGECHAIN_MAX_RETRIES`,
    /// `STAGECHAIN_BACKOFF_SECONDS`, `STAGECHAIN_BACKOFF`,
    /// `STAGECHAIN_LOG_LEVEL`, `STAGECHAIN_LOG_JSON`.
    pub fn with_env_overrides<I, K, V>(mut self, vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_string(), v.into()))
            .collect();

        if let Some(v) = vars.get("STAGECHAIN_BASE_URL") {
            self.provider.base_url = v.clone();
        }
        if let Some(v) = vars.get("STAGECHAIN_MODEL") {
            self.provider.model = v.clone();
        }
        if let Some(v) = vars
            .get("STAGECHAIN_API_KEY")
            .or_else(|| vars.get("OPENAI_API_KEY"))
        {
            self.provider.api_key = Some(v.clone());
        }
        if let Some(v) = vars.get("STAGECHAIN_TIMEOUT_SECONDS") {
            self.provider.timeout_seconds = parse_number("STAGECHAIN_TIMEOUT_SECONDS", v)?;
        }
        if let Some(v) = vars.get("STAGECHAIN_CONTEXT_MODE") {
            self.executor.context_mode = v
                .parse()
                .map_err(|e: String| ConfigError::invalid("STAGECHAIN_CONTEXT_MODE", e))?;
        }
        if let Some(v) = vars.get("STAGECHAIN_STAGE_TIMEOUT_SECONDS") {
            self.executor.stage_timeout_seconds =
                Some(parse_number("STAGECHAIN_STAGE_TIMEOUT_SECONDS", v)?);
        }
        if let Some(v) = vars.get("STAGECHAIN_MAX_RETRIES") {
            self.retry.max_retries = v
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid("STAGECHAIN_MAX_RETRIES", "expected an integer"))?;
        }
        if let Some(v) = vars.get("STAGECHAIN_BACKOFF_SECONDS") {
            self.retry.backoff_seconds = parse_number("STAGECHAIN_BACKOFF_SECONDS", v)?;
        }
        if let Some(v) = vars.get("STAGECHAIN_BACKOFF") {
            self.retry.backoff = v
                .parse::<BackoffStrategy>()
                .map_err(|e| ConfigError::invalid("STAGECHAIN_BACKOFF", e))?;
        }
        if let Some(v) = vars.get("STAGECHAIN_LOG_LEVEL") {
            self.logging.level = v.clone();
        }
        if let Some(v) = vars.get("STAGECHAIN_LOG_JSON") {
            self.logging.json = matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }

        self.validate()?;
        Ok(self)
    }

    /// Checks values that deserialize fine but cannot work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.base_url.trim().is_empty() {
            return Err(ConfigError::invalid("provider.base_url", "cannot be empty"));
        }
        if self.provider.model.trim().is_empty() {
            return Err(ConfigError::invalid("provider.model", "cannot be empty"));
        }
        if !(self.provider.timeout_seconds > 0.0) {
            return Err(ConfigError::invalid("provider.timeout_seconds", "must be positive"));
        }
        if let Some(t) = self.executor.stage_timeout_seconds {
            if !(t > 0.0) {
                return Err(ConfigError::invalid(
                    "executor.stage_timeout_seconds",
                    "must be positive",
                ));
            }
        }
        if self.retry.backoff_seconds < 0.0 {
            return Err(ConfigError::invalid("retry.backoff_seconds", "cannot be negative"));
        }
        Ok(())
    }
}

fn seconds_to_duration(seconds: f64) -> Duration {
    Duration::try_from_secs_f64(seconds.max(0.0)).unwrap_or(Duration::MAX)
}

fn parse_number(key: &str, value: &str) -> Result<f64, ConfigError> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|_| ConfigError::invalid(key, format!("'{value}' is not a number")))
}
