//! Per-stage result records.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils::Timestamp;

/// Classification of a stage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageErrorKind {
    /// The model/tool call failed (network, provider, cancelled mid-call).
    Invocation,
    /// The call returned, but with no usable text.
    EmptyOutput,
    /// The per-stage timeout elapsed.
    Timeout,
    /// The output did not match the stage's declared schema.
    SchemaViolation,
}

impl fmt::Display for StageErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invocation => write!(f, "invocation"),
            Self::EmptyOutput => write!(f, "empty_output"),
            Self::Timeout => write!(f, "timeout"),
            Self::SchemaViolation => write!(f, "schema_violation"),
        }
    }
}

/// Why a stage failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageError {
    /// Failure classification.
    pub kind: StageErrorKind,
    /// Human-readable cause.
    pub message: String,
}

impl StageError {
    /// Creates a new stage error.
    #[must_use]
    pub fn new(kind: StageErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// The output of a single stage invocation.
///
/// Created once by the executor and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    /// The stage that produced this result.
    pub stage_name: String,

    /// Text returned by the stage (empty when it failed).
    pub output_text: String,

    /// Whether the stage succeeded.
    pub succeeded: bool,

    /// The failure cause, when `succeeded` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StageError>,

    /// The literal prompt that was sent.
    pub prompt: String,

    /// Validated structured output, when the stage declares a schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured: Option<serde_json::Value>,

    /// Model reported by the invocation boundary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Wall-clock time spent in the stage.
    pub duration_ms: f64,

    /// When the stage started.
    pub started_at: Timestamp,

    /// When the stage finished.
    pub finished_at: Timestamp,
}

impl StageResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(
        stage_name: impl Into<String>,
        prompt: impl Into<String>,
        output_text: impl Into<String>,
        started_at: Timestamp,
        finished_at: Timestamp,
    ) -> Self {
        Self {
            stage_name: stage_name.into(),
            output_text: output_text.into(),
            succeeded: true,
            error: None,
            prompt: prompt.into(),
            structured: None,
            model: None,
            duration_ms: elapsed_ms(started_at, finished_at),
            started_at,
            finished_at,
        }
    }

    /// Creates a failed result.
    #[must_use]
    pub fn failure(
        stage_name: impl Into<String>,
        prompt: impl Into<String>,
        error: StageError,
        started_at: Timestamp,
        finished_at: Timestamp,
    ) -> Self {
        Self {
            stage_name: stage_name.into(),
            output_text: String::new(),
            succeeded: false,
            error: Some(error),
            prompt: prompt.into(),
            structured: None,
            model: None,
            duration_ms: elapsed_ms(started_at, finished_at),
            started_at,
            finished_at,
        }
    }

    /// Attaches validated structured output.
    #[must_use]
    pub fn with_structured(mut self, value: serde_json::Value) -> Self {
        self.structured = Some(value);
        self
    }

    /// Attaches the model name.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Returns the error message, if any.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.message.as_str())
    }
}

#[allow(clippy::cast_precision_loss)]
fn elapsed_ms(start: Timestamp, end: Timestamp) -> f64 {
    (end - start)
        .num_microseconds()
        .map_or(0.0, |us| us.max(0) as f64 / 1000.0)
}
