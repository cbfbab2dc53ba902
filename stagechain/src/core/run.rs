//! The record of one end-to-end pipeline execution.

use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use super::{RunStatus, StageResult};
use crate::utils::{generate_uuid, now, Timestamp};

/// Why a run failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunError {
    /// The failing stage; `None` when the run was cancelled between stages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    /// Human-readable cause.
    pub message: String,
}

impl RunError {
    /// A failure attributed to a stage.
    #[must_use]
    pub fn at_stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage: Some(stage.into()),
            message: message.into(),
        }
    }

    /// A failure not attributable to a stage.
    #[must_use]
    pub fn run_level(message: impl Into<String>) -> Self {
        Self {
            stage: None,
            message: message.into(),
        }
    }
}

/// One execution of a stage sequence against an initial input.
///
/// A run owns its stage results exclusively; nothing is shared between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Unique ID for this run.
    pub run_id: Uuid,
    /// Name of the pipeline that produced this run.
    pub pipeline_name: String,
    /// The input the first stage received.
    pub initial_input: String,
    /// Results in stage order, one per attempted stage.
    pub stage_results: Vec<StageResult>,
    /// Current status.
    pub status: RunStatus,
    /// Failure cause when `status` is `failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RunError>,
    /// Attempt number (1-based) when produced under a retry policy.
    pub attempt: usize,
    /// When the run entered `running`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<Timestamp>,
    /// When the run reached a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<Timestamp>,
}

impl PipelineRun {
    /// Creates a pending run.
    #[must_use]
    pub fn new(pipeline_name: impl Into<String>, initial_input: impl Into<String>) -> Self {
        Self {
            run_id: generate_uuid(),
            pipeline_name: pipeline_name.into(),
            initial_input: initial_input.into(),
            stage_results: Vec::new(),
            status: RunStatus::Pending,
            error: None,
            attempt: 1,
            started_at: None,
            finished_at: None,
        }
    }

    /// Moves `pending -> running`.
    pub fn start(&mut self) -> bool {
        if self.transition(RunStatus::Running) {
            self.started_at = Some(now());
            true
        } else {
            false
        }
    }

    /// Moves `running -> completed`.
    pub fn complete(&mut self) -> bool {
        if self.transition(RunStatus::Completed) {
            self.finished_at = Some(now());
            true
        } else {
            false
        }
    }

    /// Moves `running -> failed` and records the cause.
    pub fn fail(&mut self, error: RunError) -> bool {
        if self.transition(RunStatus::Failed) {
            self.error = Some(error);
            self.finished_at = Some(now());
            true
        } else {
            false
        }
    }

    /// Appends a stage result. Only accepted while running.
    pub fn record(&mut self, result: StageResult) -> bool {
        if self.status != RunStatus::Running {
            warn!(
                run_id = %self.run_id,
                stage = %result.stage_name,
                status = %self.status,
                "Refusing to record stage result outside of a running run"
            );
            return false;
        }
        self.stage_results.push(result);
        true
    }

    fn transition(&mut self, next: RunStatus) -> bool {
        if self.status.can_transition_to(next) {
            self.status = next;
            true
        } else {
            warn!(
                run_id = %self.run_id,
                from = %self.status,
                to = %next,
                "Illegal run status transition"
            );
            false
        }
    }

    /// Texts of the successful stages, in order.
    #[must_use]
    pub fn stage_outputs(&self) -> Vec<&str> {
        self.stage_results
            .iter()
            .filter(|r| r.succeeded)
            .map(|r| r.output_text.as_str())
            .collect()
    }

    /// The last stage's text, only when the run completed.
    #[must_use]
    pub fn final_output(&self) -> Option<&str> {
        if self.status == RunStatus::Completed {
            self.stage_results.last().map(|r| r.output_text.as_str())
        } else {
            None
        }
    }

    /// The most recent successful stage output.
    #[must_use]
    pub fn last_successful_output(&self) -> Option<&str> {
        self.stage_results
            .iter()
            .rev()
            .find(|r| r.succeeded)
            .map(|r| r.output_text.as_str())
    }

    /// Name of the stage that failed, if any.
    #[must_use]
    pub fn failed_stage(&self) -> Option<&str> {
        self.error.as_ref().and_then(|e| e.stage.as_deref())
    }

    /// Looks up a stage result by name.
    #[must_use]
    pub fn result_for(&self, stage_name: &str) -> Option<&StageResult> {
        self.stage_results.iter().find(|r| r.stage_name == stage_name)
    }

    /// Returns true if the run completed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Total wall-clock time, once the run is terminal.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration_ms(&self) -> Option<f64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => (end - start)
                .num_microseconds()
                .map(|us| us.max(0) as f64 / 1000.0),
            _ => None,
        }
    }

    /// Serializes the run as compact JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serializes the run as pretty-printed JSON.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
