//! Subscriber setup and span attribute helpers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;
use crate::core::{PipelineRun, StageResult};

/// Installs a global `tracing` subscriber.
///
/// `RUST_LOG` wins over `config.level` when set. Returns `false` if a
/// subscriber was already installed, which leaves the existing one in place.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let installed = if config.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_current_span(false))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .try_init()
    };
    installed.is_ok()
}

/// Attributes describing a pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSpanFields {
    /// Pipeline name.
    pub pipeline_name: String,
    /// Run ID.
    pub run_id: String,
    /// Attempt number.
    pub attempt: usize,
    /// Run status.
    pub status: String,
    /// Stage results recorded so far.
    pub completed_stages: usize,
    /// Failing stage, if any.
    pub failed_stage: Option<String>,
    /// Wall time, once finished.
    pub duration_ms: Option<f64>,
}

impl RunSpanFields {
    /// Captures the current state of `run`.
    #[must_use]
    pub fn from_run(run: &PipelineRun) -> Self {
        Self {
            pipeline_name: run.pipeline_name.clone(),
            run_id: run.run_id.to_string(),
            attempt: run.attempt,
            status: run.status.to_string(),
            completed_stages: run.stage_outputs().len(),
            failed_stage: run.failed_stage().map(str::to_string),
            duration_ms: run.duration_ms(),
        }
    }

    /// Flattens to dotted attribute names.
    #[must_use]
    pub fn to_attributes(&self) -> HashMap<String, String> {
        let mut attrs = HashMap::new();
        attrs.insert("pipeline.name".to_string(), self.pipeline_name.clone());
        attrs.insert("pipeline.run_id".to_string(), self.run_id.clone());
        attrs.insert("pipeline.attempt".to_string(), self.attempt.to_string());
        attrs.insert("pipeline.status".to_string(), self.status.clone());
        attrs.insert(
            "pipeline.completed_stages".to_string(),
            self.completed_stages.to_string(),
        );
        if let Some(ref v) = self.failed_stage {
            attrs.insert("pipeline.failed_stage".to_string(), v.clone());
        }
        if let Some(v) = self.duration_ms {
            attrs.insert("pipeline.duration_ms".to_string(), v.to_string());
        }
        attrs
    }
}

/// Attributes describing one stage invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageSpanFields {
    /// Stage name.
    pub stage_name: String,
    /// Whether the output was accepted.
    pub succeeded: bool,
    /// Duration in milliseconds.
    pub duration_ms: f64,
    /// Model that answered.
    pub model: Option<String>,
    /// Failure kind, if failed.
    pub error_kind: Option<String>,
    /// Output length in characters.
    pub output_chars: usize,
}

impl StageSpanFields {
    /// Captures `result`.
    #[must_use]
    pub fn from_result(result: &StageResult) -> Self {
        Self {
            stage_name: result.stage_name.clone(),
            succeeded: result.succeeded,
            duration_ms: result.duration_ms,
            model: result.model.clone(),
            error_kind: result.error.as_ref().map(|e| e.kind.to_string()),
            output_chars: result.output_text.chars().count(),
        }
    }

    /// Flattens to dotted attribute names.
    #[must_use]
    pub fn to_attributes(&self) -> HashMap<String, String> {
        let mut attrs = HashMap::new();
        attrs.insert("stage.name".to_string(), self.stage_name.clone());
        attrs.insert("stage.succeeded".to_string(), self.succeeded.to_string());
        attrs.insert("stage.duration_ms".to_string(), self.duration_ms.to_string());
        attrs.insert("stage.output_chars".to_string(), self.output_chars.to_string());
        if let Some(ref v) = self.model {
            attrs.insert("stage.model".to_string(), v.clone());
        }
        if let Some(ref v) = self.error_kind {
            attrs.insert("stage.error_kind".to_string(), v.clone());
        }
        attrs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{RunError, StageError, StageErrorKind};
    use crate::utils::now;

    #[test]
    fn test_init_tracing_is_idempotent() {
        let config = LoggingConfig::default();
        let _ = init_tracing(&config);
        assert!(!init_tracing(&config));
    }

    #[test]
    fn test_run_fields() {
        let mut run = PipelineRun::new("changelog", "commits");
        run.start();
        let t = now();
        run.record(StageResult::success("tech-lead", "p", "summary", t, t));
        run.record(StageResult::failure(
            "growth-hacker",
            "p",
            StageError::new(StageErrorKind::Timeout, "slow"),
            t,
            t,
        ));
        run.fail(RunError::at_stage("growth-hacker", "slow"));

        let fields = RunSpanFields::from_run(&run);
        assert_eq!(fields.completed_stages, 1);
        assert_eq!(fields.status, "failed");

        let attrs = fields.to_attributes();
        assert_eq!(attrs.get("pipeline.name").map(String::as_str), Some("changelog"));
        assert_eq!(
            attrs.get("pipeline.failed_stage").map(String::as_str),
            Some("growth-hacker")
        );
    }

    #[test]
    fn test_stage_fields() {
        let t = now();
        let result = StageResult::success("formatter", "p", "héllo", t, t).with_model("gpt-4o");
        let attrs = StageSpanFields::from_result(&result).to_attributes();
        assert_eq!(attrs.get("stage.output_chars").map(String::as_str), Some("5"));
        assert_eq!(attrs.get("stage.model").map(String::as_str), Some("gpt-4o"));
        assert!(!attrs.contains_key("stage.error_kind"));
    }
}
