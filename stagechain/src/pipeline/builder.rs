//! Pipeline builder with validation.

use std::sync::Arc;

use super::executor::{validate_stages, SequentialExecutor};
use super::retry::{run_with_retry, RetryPolicy};
use crate::cancellation::CancellationToken;
use crate::config::ExecutorConfig;
use crate::core::PipelineRun;
use crate::errors::PipelineConfigurationError;
use crate::events::EventSink;
use crate::invoke::Invoker;
use crate::stages::Stage;

/// Builder for validated sequential pipelines.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    name: String,
    stages: Vec<Stage>,
    invoker: Option<Arc<dyn Invoker>>,
    config: ExecutorConfig,
    events: Option<Arc<dyn EventSink>>,
}

impl PipelineBuilder {
    /// Creates a builder for a pipeline called `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            invoker: None,
            config: ExecutorConfig::default(),
            events: None,
        }
    }

    /// Appends a stage. Stages run in the order they are added.
    #[must_use]
    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Appends several stages.
    #[must_use]
    pub fn stages(mut self, stages: impl IntoIterator<Item = Stage>) -> Self {
        self.stages.extend(stages);
        self
    }

    /// Sets the invoker every stage is sent through.
    #[must_use]
    pub fn invoker(mut self, invoker: Arc<dyn Invoker>) -> Self {
        self.invoker = Some(invoker);
        self
    }

    /// Sets the executor configuration.
    #[must_use]
    pub fn config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = Some(sink);
        self
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of stages added so far.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Validates and builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if no invoker was set or the stages are invalid.
    pub fn build(self) -> Result<Pipeline, PipelineConfigurationError> {
        validate_stages(&self.stages)?;
        let invoker = self
            .invoker
            .ok_or_else(|| PipelineConfigurationError::missing_invoker(&self.name))?;

        let mut executor = SequentialExecutor::new(invoker)
            .with_config(self.config)
            .with_pipeline_name(&self.name);
        if let Some(events) = self.events {
            executor = executor.with_event_sink(events);
        }

        Ok(Pipeline {
            name: self.name,
            stages: self.stages.into(),
            executor,
        })
    }
}

/// A validated, immutable stage sequence bound to an executor.
///
/// Cheap to clone; clones share the stage list.
#[derive(Debug, Clone)]
pub struct Pipeline {
    name: String,
    stages: Arc<[Stage]>,
    executor: SequentialExecutor,
}

impl Pipeline {
    /// Starts a builder.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> PipelineBuilder {
        PipelineBuilder::new(name)
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the stages in execution order.
    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Returns the stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    /// Returns the executor.
    #[must_use]
    pub fn executor(&self) -> &SequentialExecutor {
        &self.executor
    }

    /// Runs the pipeline once.
    pub async fn run(&self, initial_input: &str) -> PipelineRun {
        self.execute(initial_input, None, 1).await
    }

    /// Runs the pipeline once, checking `token` before every stage.
    pub async fn run_with_cancellation(
        &self,
        initial_input: &str,
        token: &CancellationToken,
    ) -> PipelineRun {
        self.execute(initial_input, Some(token), 1).await
    }

    /// Runs the pipeline under a whole-run retry policy.
    pub async fn run_with_retry(&self, initial_input: &str, policy: &RetryPolicy) -> PipelineRun {
        run_with_retry(self, initial_input, policy).await
    }

    pub(crate) async fn execute(
        &self,
        initial_input: &str,
        token: Option<&CancellationToken>,
        attempt: usize,
    ) -> PipelineRun {
        self.executor
            .execute(&self.stages, initial_input, token, attempt)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoke::{Invocation, MockInvoker};
    use crate::stages::AgentIdentity;

    fn stage(name: &str) -> Stage {
        Stage::new(name, AgentIdentity::new(name), "{context}")
    }

    fn echo() -> Arc<dyn Invoker> {
        let mut mock = MockInvoker::new();
        mock.expect_invoke()
            .returning(|_, prompt| Ok(Invocation::text(prompt.to_string())));
        Arc::new(mock)
    }

    #[test]
    fn test_build_requires_stages() {
        let err = PipelineBuilder::new("empty").invoker(echo()).build().unwrap_err();
        assert_eq!(err.code(), Some("PIPELINE-EMPTY"));
    }

    #[test]
    fn test_build_requires_invoker() {
        let err = PipelineBuilder::new("p").stage(stage("a")).build().unwrap_err();
        assert_eq!(err.code(), Some("PIPELINE-NO_INVOKER"));
    }

    #[test]
    fn test_build_keeps_order() {
        let pipeline = Pipeline::builder("ordered")
            .stage(stage("first"))
            .stages([stage("second"), stage("third")])
            .invoker(echo())
            .build()
            .unwrap();

        assert_eq!(pipeline.name(), "ordered");
        assert_eq!(pipeline.stage_names(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_pipeline_run_uses_name() {
        let pipeline = Pipeline::builder("echo")
            .stage(stage("only"))
            .invoker(echo())
            .build()
            .unwrap();

        let run = pipeline.run("hello").await;
        assert!(run.is_success());
        assert_eq!(run.pipeline_name, "echo");
        assert_eq!(run.final_output(), Some("hello"));
    }
}
