//! The sequential executor.
//!
//! Runs stages strictly in declared order. Each stage's prompt is a pure
//! function of the initial input and the outputs before it; the first
//! failure halts the run and everything completed so far is kept.

use serde_json::{json, Value};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::context::build_context;
use crate::cancellation::CancellationToken;
use crate::config::ExecutorConfig;
use crate::core::{PipelineRun, RunError, StageResult};
use crate::errors::PipelineConfigurationError;
use crate::events::{event_types, EventSink, NoOpEventSink};
use crate::invoke::{invoke_stage, Invoker};
use crate::observability::{RunSpanFields, StageSpanFields};
use crate::stages::Stage;
use crate::utils::now;

/// Name used for runs not produced through a named [`Pipeline`](super::Pipeline).
pub const DEFAULT_PIPELINE_NAME: &str = "sequential";

/// Checks a stage list before anything is invoked.
///
/// Rejects an empty list, blank names, duplicate names and templates
/// without `{context}`.
pub fn validate_stages(stages: &[Stage]) -> Result<(), PipelineConfigurationError> {
    if stages.is_empty() {
        return Err(PipelineConfigurationError::empty_pipeline());
    }

    let mut seen = HashSet::with_capacity(stages.len());
    for (index, stage) in stages.iter().enumerate() {
        stage.validate(index)?;
        if !seen.insert(stage.name.as_str()) {
            return Err(PipelineConfigurationError::duplicate_stage(&stage.name));
        }
    }
    Ok(())
}

/// Executes stage sequences against an invoker.
///
/// Holds no per-run state, so one executor can serve many concurrent runs.
#[derive(Clone)]
pub struct SequentialExecutor {
    invoker: Arc<dyn Invoker>,
    config: ExecutorConfig,
    events: Arc<dyn EventSink>,
    pipeline_name: String,
}

impl fmt::Debug for SequentialExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequentialExecutor")
            .field("invoker", &self.invoker)
            .field("config", &self.config)
            .field("pipeline_name", &self.pipeline_name)
            .finish_non_exhaustive()
    }
}

impl SequentialExecutor {
    /// Creates an executor with default configuration and no event sink.
    #[must_use]
    pub fn new(invoker: Arc<dyn Invoker>) -> Self {
        Self {
            invoker,
            config: ExecutorConfig::default(),
            events: Arc::new(NoOpEventSink),
            pipeline_name: DEFAULT_PIPELINE_NAME.to_string(),
        }
    }

    /// Sets the executor configuration.
    #[must_use]
    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Sets the name recorded on runs.
    #[must_use]
    pub fn with_pipeline_name(mut self, name: impl Into<String>) -> Self {
        self.pipeline_name = name.into();
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Returns the event sink.
    #[must_use]
    pub fn events(&self) -> &Arc<dyn EventSink> {
        &self.events
    }

    /// Returns the invoker.
    #[must_use]
    pub fn invoker(&self) -> &Arc<dyn Invoker> {
        &self.invoker
    }

    /// Runs `stages` in order against `initial_input`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineConfigurationError`] before invoking anything if the
    /// stage list is unusable. Stage failures are not errors: they are
    /// recorded on the returned run.
    pub async fn run(
        &self,
        stages: &[Stage],
        initial_input: &str,
    ) -> Result<PipelineRun, PipelineConfigurationError> {
        validate_stages(stages)?;
        Ok(self.execute(stages, initial_input, None, 1).await)
    }

    /// Like [`run`](Self::run), checking `token` before every stage.
    ///
    /// # Errors
    ///
    /// Same as [`run`](Self::run).
    pub async fn run_with_cancellation(
        &self,
        stages: &[Stage],
        initial_input: &str,
        token: &CancellationToken,
    ) -> Result<PipelineRun, PipelineConfigurationError> {
        validate_stages(stages)?;
        Ok(self.execute(stages, initial_input, Some(token), 1).await)
    }

    /// Executes already-validated stages.
    pub(crate) async fn execute(
        &self,
        stages: &[Stage],
        initial_input: &str,
        token: Option<&CancellationToken>,
        attempt: usize,
    ) -> PipelineRun {
        let mut run = PipelineRun::new(&self.pipeline_name, initial_input);
        run.attempt = attempt;
        run.start();

        info!(
            run_id = %run.run_id,
            pipeline = %run.pipeline_name,
            stages = stages.len(),
            attempt,
            "Pipeline run started"
        );
        self.emit(
            &run,
            event_types::RUN_STARTED,
            json!({ "stages": stages.len(), "attempt": attempt }),
        );

        for (index, stage) in stages.iter().enumerate() {
            if let Some(token) = token.filter(|t| t.is_cancelled()) {
                let reason = token.reason().unwrap_or_else(|| "cancelled".to_string());
                warn!(
                    run_id = %run.run_id,
                    pipeline = %run.pipeline_name,
                    next_stage = %stage.name,
                    reason = %reason,
                    "Pipeline run cancelled"
                );
                run.fail(RunError::run_level(format!("cancelled: {reason}")));
                self.emit(
                    &run,
                    event_types::RUN_CANCELLED,
                    json!({ "reason": reason, "next_stage": stage.name, "completed_stages": index }),
                );
                return run;
            }

            let context = build_context(
                self.config.context_mode,
                &self.config.history_separator,
                &run.initial_input,
                &run.stage_outputs(),
            );
            let prompt = stage.render_prompt(&context, &run.initial_input);

            debug!(
                run_id = %run.run_id,
                stage = %stage.name,
                index,
                prompt_chars = prompt.len(),
                "Invoking stage"
            );
            self.emit(
                &run,
                event_types::STAGE_STARTED,
                json!({ "stage": stage.name, "index": index }),
            );

            let started_at = now();
            match invoke_stage(
                self.invoker.as_ref(),
                stage,
                &prompt,
                self.config.stage_timeout(),
            )
            .await
            {
                Ok(accepted) => {
                    let mut result =
                        StageResult::success(&stage.name, prompt, accepted.text, started_at, now());
                    if let Some(value) = accepted.structured {
                        result = result.with_structured(value);
                    }
                    if let Some(model) = accepted.model {
                        result = result.with_model(model);
                    }

                    info!(
                        run_id = %run.run_id,
                        stage = %stage.name,
                        duration_ms = result.duration_ms,
                        "Stage completed"
                    );
                    self.emit(
                        &run,
                        event_types::STAGE_COMPLETED,
                        json!({
                            "stage": stage.name,
                            "index": index,
                            "duration_ms": result.duration_ms,
                            "attributes": StageSpanFields::from_result(&result).to_attributes(),
                        }),
                    );
                    run.record(result);
                }
                Err(err) => {
                    let stage_error = err.to_stage_error();
                    let kind = stage_error.kind;
                    let message = stage_error.message.clone();
                    let result =
                        StageResult::failure(&stage.name, prompt, stage_error, started_at, now());

                    warn!(
                        run_id = %run.run_id,
                        pipeline = %run.pipeline_name,
                        stage = %stage.name,
                        kind = %kind,
                        duration_ms = result.duration_ms,
                        error = %message,
                        "Stage failed; halting run"
                    );
                    self.emit(
                        &run,
                        event_types::STAGE_FAILED,
                        json!({
                            "stage": stage.name,
                            "index": index,
                            "kind": kind,
                            "error": message,
                            "attributes": StageSpanFields::from_result(&result).to_attributes(),
                        }),
                    );

                    run.record(result);
                    run.fail(RunError::at_stage(&stage.name, &message));
                    self.emit(
                        &run,
                        event_types::RUN_FAILED,
                        json!({
                            "failed_stage": stage.name,
                            "error": message,
                            "attributes": RunSpanFields::from_run(&run).to_attributes(),
                        }),
                    );
                    return run;
                }
            }
        }

        run.complete();
        info!(
            run_id = %run.run_id,
            pipeline = %run.pipeline_name,
            duration_ms = run.duration_ms().unwrap_or_default(),
            "Pipeline run completed"
        );
        self.emit(
            &run,
            event_types::RUN_COMPLETED,
            json!({ "attributes": RunSpanFields::from_run(&run).to_attributes() }),
        );
        run
    }

    fn emit(&self, run: &PipelineRun, event_type: &str, mut data: Value) {
        if let Value::Object(ref mut map) = data {
            map.insert("run_id".to_string(), json!(run.run_id.to_string()));
            map.insert("pipeline".to_string(), json!(run.pipeline_name));
        }
        self.events.try_emit(event_type, Some(data));
    }
}

/// Runs `stages` once with default executor settings.
///
/// # Errors
///
/// Returns [`PipelineConfigurationError`] if the stage list is unusable.
pub async fn run(
    stages: &[Stage],
    initial_input: &str,
    invoker: Arc<dyn Invoker>,
) -> Result<PipelineRun, PipelineConfigurationError> {
    SequentialExecutor::new(invoker).run(stages, initial_input).await
}
