//! Error types for stagechain.
//!
//! Only configuration problems surface as `Err` from a pipeline run. Failures
//! that happen while stages execute are recorded on the returned
//! [`PipelineRun`](crate::core::PipelineRun) so partial progress is kept.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::invoke::InvokeError;
use crate::schema::SchemaViolation;

/// The main error type for stagechain operations.
#[derive(Debug, Error)]
pub enum StagechainError {
    /// The pipeline definition is invalid.
    #[error("{0}")]
    Configuration(#[from] PipelineConfigurationError),

    /// A stage's invocation failed.
    #[error("{0}")]
    StageInvocation(#[from] StageInvocationError),

    /// A stage returned no usable text.
    #[error("{0}")]
    StageOutputEmpty(#[from] StageOutputEmptyError),

    /// A structured output did not match its declared shape.
    #[error("{0}")]
    Schema(#[from] SchemaViolation),

    /// Loading or validating the configuration object failed.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// The run was cancelled.
    #[error("Pipeline cancelled: {0}")]
    Cancelled(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Diagnostic metadata attached to configuration errors.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ErrorInfo {
    /// Error code (e.g., "PIPELINE-EMPTY").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ErrorInfo {
    /// Creates a new error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Raised before any stage executes when the pipeline definition is unusable.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct PipelineConfigurationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Optional diagnostic info.
    pub info: Option<ErrorInfo>,
}

impl PipelineConfigurationError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            info: None,
        }
    }

    /// The stage list was empty.
    #[must_use]
    pub fn empty_pipeline() -> Self {
        Self::new("Pipeline has no stages").with_info(
            ErrorInfo::new("PIPELINE-EMPTY", "Cannot run an empty pipeline")
                .with_fix_hint("Add at least one stage to the pipeline before running it."),
        )
    }

    /// A template lacks the `{context}` placeholder.
    #[must_use]
    pub fn missing_placeholder(stage: &str, placeholder: &str) -> Self {
        Self::new(format!(
            "Stage '{stage}' prompt template is missing the {placeholder} placeholder"
        ))
        .with_stages(vec![stage.to_string()])
        .with_info(
            ErrorInfo::new(
                "PIPELINE-MISSING_PLACEHOLDER",
                format!("Template for '{stage}' has no {placeholder}"),
            )
            .with_context_entry("placeholder", placeholder),
        )
    }

    /// Two stages share a name.
    #[must_use]
    pub fn duplicate_stage(stage: &str) -> Self {
        Self::new(format!("Stage '{stage}' is defined more than once"))
            .with_stages(vec![stage.to_string()])
            .with_info(ErrorInfo::new(
                "PIPELINE-DUPLICATE_STAGE",
                format!("Duplicate stage name '{stage}'"),
            ))
    }

    /// A stage name is empty or whitespace-only.
    #[must_use]
    pub fn invalid_name(index: usize) -> Self {
        Self::new(format!("Stage at position {index} has an empty name")).with_info(
            ErrorInfo::new("PIPELINE-INVALID_NAME", "Stage names cannot be empty")
                .with_context_entry("index", index.to_string()),
        )
    }

    /// A pipeline was built without an invoker.
    #[must_use]
    pub fn missing_invoker(pipeline: &str) -> Self {
        Self::new(format!("Pipeline '{pipeline}' has no invoker"))
            .with_info(ErrorInfo::new("PIPELINE-NO_INVOKER", "No invoker configured"))
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the diagnostic info.
    #[must_use]
    pub fn with_info(mut self, info: ErrorInfo) -> Self {
        if let Some(hint) = ErrorSuggestions::get(&info.code) {
            if info.fix_hint.is_none() {
                self.info = Some(info.with_fix_hint(hint));
                return self;
            }
        }
        self.info = Some(info);
        self
    }

    /// Returns the error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.info.as_ref().map(|i| i.code.as_str())
    }
}

/// The invocation boundary failed for a stage.
#[derive(Debug, Error)]
#[error("Stage '{stage}' invocation failed: {source}")]
pub struct StageInvocationError {
    /// The stage whose call failed.
    pub stage: String,
    /// The underlying boundary error.
    #[source]
    pub source: InvokeError,
}

impl StageInvocationError {
    /// Creates a new invocation error.
    #[must_use]
    pub fn new(stage: impl Into<String>, source: InvokeError) -> Self {
        Self {
            stage: stage.into(),
            source,
        }
    }
}

/// A stage call succeeded transport-wise but produced no usable text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Stage '{stage}' returned no usable text")]
pub struct StageOutputEmptyError {
    /// The stage that returned nothing.
    pub stage: String,
}

impl StageOutputEmptyError {
    /// Creates a new empty-output error.
    #[must_use]
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
        }
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        /// The file path.
        path: String,
        /// The IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config document could not be parsed.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value was present but unusable.
    #[error("Invalid config value for '{key}': {message}")]
    Invalid {
        /// The offending key.
        key: String,
        /// Why it is invalid.
        message: String,
    },
}

impl ConfigError {
    /// Creates an invalid-value error.
    #[must_use]
    pub fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Default fix hints for configuration error codes.
pub struct ErrorSuggestions;

impl ErrorSuggestions {
    /// Gets a suggestion for a given error code.
    #[must_use]
    pub fn get(code: &str) -> Option<&'static str> {
        match code {
            "PIPELINE-EMPTY" => Some("Add at least one stage to the pipeline before running it."),
            "PIPELINE-MISSING_PLACEHOLDER" => Some(
                "Every prompt template must contain {context}; the first stage receives the \
                 initial input through it.",
            ),
            "PIPELINE-DUPLICATE_STAGE" => {
                Some("Give each stage a unique name so failures can be attributed.")
            }
            "PIPELINE-INVALID_NAME" => Some("Stage names must contain non-whitespace characters."),
            "PIPELINE-NO_INVOKER" => {
                Some("Call PipelineBuilder::invoker with the model client every stage should use.")
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_pipeline_error_has_code_and_hint() {
        let err = PipelineConfigurationError::empty_pipeline();
        assert_eq!(err.code(), Some("PIPELINE-EMPTY"));
        assert!(err.info.unwrap().fix_hint.is_some());
    }

    #[test]
    fn test_missing_placeholder_names_stage() {
        let err = PipelineConfigurationError::missing_placeholder("formatter", "{context}");
        assert_eq!(err.stages, vec!["formatter".to_string()]);
        assert!(err.to_string().contains("formatter"));
        let info = err.info.unwrap();
        assert_eq!(info.context.get("placeholder").map(String::as_str), Some("{context}"));
        assert!(info.fix_hint.is_some());
    }

    #[test]
    fn test_invocation_error_display() {
        let err = StageInvocationError::new("summarizer", InvokeError::Transport("refused".into()));
        let text = err.to_string();
        assert!(text.contains("summarizer"));
        assert!(text.contains("refused"));
    }

    #[test]
    fn test_suggestions() {
        assert!(ErrorSuggestions::get("PIPELINE-DUPLICATE_STAGE").is_some());
        assert!(ErrorSuggestions::get("UNKNOWN").is_none());
    }

    #[test]
    fn test_config_error_invalid() {
        let err = ConfigError::invalid("provider.base_url", "cannot be empty");
        assert!(err.to_string().contains("provider.base_url"));
    }
}
