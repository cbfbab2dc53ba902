//! End-to-end tests for sequential pipeline execution.

#[cfg(test)]
mod tests {
    use crate::cancellation::CancellationToken;
    use crate::config::ExecutorConfig;
    use crate::core::{RunStatus, StageErrorKind};
    use crate::events::CollectingEventSink;
    use crate::invoke::{FnInvoker, Invocation, InvokeError, Invoker};
    use crate::pipeline::{
        run, run_batch, run_with_retry_and_cancellation, BackoffStrategy, ContextMode, Pipeline,
        RetryPolicy, SequentialExecutor,
    };
    use crate::schema::{FieldKind, FieldSpec, OutputSchema};
    use crate::stages::{AgentIdentity, Stage};
    use crate::testing::{
        assert_prompt_sent, assert_run_completed, assert_run_failed_at, assert_stage_outputs,
        relay_stages, summarizer_formatter_stages, test_stage, EmptyInvoker, FailingInvoker,
        RecordingInvoker, ScriptedInvoker, SlowInvoker,
    };
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::Duration;

    /// Logs when each call starts and ends.
    #[derive(Debug, Default)]
    struct OrderProbe {
        log: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Invoker for OrderProbe {
        async fn invoke(&self, identity: &AgentIdentity, _prompt: &str) -> Result<Invocation, InvokeError> {
            self.log.lock().push(format!("start:{}", identity.name));
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.log.lock().push(format!("end:{}", identity.name));
            Ok(Invocation::text(format!("{} output", identity.name)))
        }
    }

    fn three_stages() -> Vec<Stage> {
        vec![
            test_stage("a", "A got: {context}"),
            test_stage("b", "B got: {context}"),
            test_stage("c", "C got: {context}"),
        ]
    }

    fn no_wait_retry(max_retries: usize) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_retries(max_retries)
            .with_backoff(BackoffStrategy::Constant)
            .with_backoff_seconds(0.0)
    }

    #[tokio::test]
    async fn test_stages_never_overlap() {
        let probe = Arc::new(OrderProbe::default());
        let run = run(&relay_stages(4), "go", probe.clone()).await.unwrap();

        assert_run_completed(&run);
        let log = probe.log.lock().clone();
        let expected: Vec<String> = (0..4)
            .flat_map(|i| [format!("start:stage-{i}"), format!("end:stage-{i}")])
            .collect();
        assert_eq!(log, expected);
    }

    #[tokio::test]
    async fn test_summarizer_formatter_scenario() {
        let scripted = Arc::new(
            ScriptedInvoker::new()
                .respond("summarizer", "A: did X, did Y")
                .respond("formatter", "A did X and Y."),
        );
        let recorder = Arc::new(RecordingInvoker::new(scripted));

        let run = run(&summarizer_formatter_stages(), "raw log: X; Y", recorder.clone())
            .await
            .unwrap();

        assert_run_completed(&run);
        assert_prompt_sent(&recorder, 0, "Summarize: raw log: X; Y");
        assert_prompt_sent(&recorder, 1, "Rewrite as one sentence: A: did X, did Y");
        assert_eq!(recorder.identity_names(), vec!["summarizer", "formatter"]);
        assert_eq!(run.final_output(), Some("A did X and Y."));
    }

    #[tokio::test]
    async fn test_always_failing_transport() {
        let invoker = Arc::new(FailingInvoker::transport("connection reset by peer"));
        let run = run(&three_stages(), "input", invoker.clone()).await.unwrap();

        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.stage_outputs().is_empty());
        assert_run_failed_at(&run, "a");
        assert!(run.error.as_ref().unwrap().message.contains("connection reset by peer"));
        assert_eq!(invoker.call_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_pipeline_invokes_nothing() {
        let recorder = Arc::new(RecordingInvoker::echo());
        let err = run(&[], "anything", recorder.clone()).await.unwrap_err();

        assert_eq!(err.code(), Some("PIPELINE-EMPTY"));
        assert_eq!(recorder.call_count(), 0);
    }

    #[tokio::test]
    async fn test_partial_progress_preserved() {
        let invoker = ScriptedInvoker::new()
            .respond("a", "first result")
            .fail(
                "b",
                InvokeError::Provider {
                    status: 500,
                    message: "model overloaded".into(),
                },
            )
            .respond("c", "never used");
        let invoker = Arc::new(invoker);

        let run = run(&three_stages(), "input", invoker.clone()).await.unwrap();

        assert_run_failed_at(&run, "b");
        assert_stage_outputs(&run, &["first result"]);
        assert_eq!(run.stage_results.len(), 2);
        assert!(run.result_for("c").is_none());
        assert_eq!(run.last_successful_output(), Some("first result"));
        assert_eq!(run.final_output(), None);
        assert_eq!(invoker.call_count(), 2);

        let failed = &run.stage_results[1];
        assert!(!failed.succeeded);
        assert!(failed.error_message().unwrap().contains("model overloaded"));
    }

    #[tokio::test]
    async fn test_last_only_context_is_verbatim() {
        let scripted = Arc::new(
            ScriptedInvoker::new()
                .respond("a", "  line one\n\nline two  ")
                .respond("b", "second")
                .respond("c", "third"),
        );
        let recorder = Arc::new(RecordingInvoker::new(scripted));

        let run = run(&three_stages(), "seed", recorder.clone()).await.unwrap();

        assert_run_completed(&run);
        assert_eq!(
            recorder.prompts(),
            vec![
                "A got: seed".to_string(),
                "B got:   line one\n\nline two  ".to_string(),
                "C got: second".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_full_history_context() {
        let scripted = Arc::new(
            ScriptedInvoker::new()
                .respond("a", "alpha")
                .respond("b", "beta")
                .respond("c", "gamma"),
        );
        let recorder = Arc::new(RecordingInvoker::new(scripted));
        let executor = SequentialExecutor::new(recorder.clone()).with_config(
            ExecutorConfig::new()
                .with_context_mode(ContextMode::FullHistory)
                .with_history_separator("\n---\n"),
        );

        let run = executor.run(&three_stages(), "seed").await.unwrap();

        assert_run_completed(&run);
        assert_prompt_sent(&recorder, 1, "B got: alpha");
        assert_prompt_sent(&recorder, 2, "C got: alpha\n---\nbeta");
    }

    #[tokio::test]
    async fn test_input_placeholder_reaches_later_stages() {
        let stages = vec![
            test_stage("tech-lead", "Summarize these commits: {context}"),
            test_stage("growth-hacker", "Commits:\n{input}\n\nSummary:\n{context}"),
        ];
        let recorder = Arc::new(RecordingInvoker::new(Arc::new(
            ScriptedInvoker::new()
                .respond("tech-lead", "Added dark mode.")
                .respond("growth-hacker", "Dark mode is here!"),
        )));

        let run = run(&stages, "feat: dark mode", recorder.clone()).await.unwrap();

        assert_run_completed(&run);
        assert_prompt_sent(&recorder, 1, "Commits:\nfeat: dark mode\n\nSummary:\nAdded dark mode.");
    }

    #[tokio::test]
    async fn test_prompts_recorded_on_results() {
        let run = run(&summarizer_formatter_stages(), "log", Arc::new(RecordingInvoker::echo()))
            .await
            .unwrap();

        assert_eq!(run.stage_results[0].prompt, "Summarize: log");
        assert_eq!(
            run.stage_results[1].prompt,
            "Rewrite as one sentence: summarizer saw: Summarize: log"
        );
    }

    #[tokio::test]
    async fn test_empty_output_halts_run() {
        let run = run(&three_stages(), "input", Arc::new(EmptyInvoker)).await.unwrap();

        assert_run_failed_at(&run, "a");
        let error = run.stage_results[0].error.as_ref().unwrap();
        assert_eq!(error.kind, StageErrorKind::EmptyOutput);
        assert!(run.stage_outputs().is_empty());
    }

    #[tokio::test]
    async fn test_stage_timeout_is_a_failure() {
        let executor = SequentialExecutor::new(Arc::new(SlowInvoker::new(
            Duration::from_millis(200),
            "too late",
        )))
        .with_config(ExecutorConfig::new().with_stage_timeout(Duration::from_millis(20)));

        let run = executor.run(&three_stages(), "input").await.unwrap();

        assert_run_failed_at(&run, "a");
        assert_eq!(
            run.stage_results[0].error.as_ref().unwrap().kind,
            StageErrorKind::Timeout
        );
    }

    #[tokio::test]
    async fn test_schema_violation_halts_run() {
        let stages = vec![
            test_stage("classifier", "Classify: {context}").with_output_schema(
                OutputSchema::new("ClassificationResult").field(FieldSpec::required(
                    "category",
                    FieldKind::OneOf {
                        values: vec!["billing".into(), "support".into()],
                    },
                )),
            ),
            test_stage("responder", "Reply to: {context}"),
        ];
        let invoker = Arc::new(
            ScriptedInvoker::new()
                .respond("classifier", r#"{"category": "sales"}"#)
                .respond("responder", "unused"),
        );

        let run = run(&stages, "I was double charged", invoker.clone()).await.unwrap();

        assert_run_failed_at(&run, "classifier");
        assert_eq!(
            run.stage_results[0].error.as_ref().unwrap().kind,
            StageErrorKind::SchemaViolation
        );
        assert_eq!(invoker.call_count(), 1);
    }

    #[tokio::test]
    async fn test_structured_output_recorded() {
        let stages = vec![test_stage("classifier", "Classify: {context}").with_output_schema(
            OutputSchema::new("ClassificationResult")
                .field(FieldSpec::required("category", FieldKind::String))
                .field(FieldSpec::optional(
                    "confidence",
                    FieldKind::Number {
                        min: Some(0.0),
                        max: Some(1.0),
                    },
                )),
        )];
        let invoker = Arc::new(
            ScriptedInvoker::new()
                .respond("classifier", "```json\n{\"category\": \"billing\", \"confidence\": 0.8}\n```"),
        );

        let run = run(&stages, "refund please", invoker).await.unwrap();

        assert_run_completed(&run);
        let structured = run.stage_results[0].structured.as_ref().unwrap();
        assert_eq!(structured["category"], "billing");
    }

    #[tokio::test]
    async fn test_single_line_fenced_output_accepted() {
        let stages = vec![test_stage("c", "Classify: {context}").with_output_schema(
            OutputSchema::new("Label").field(FieldSpec::required("category", FieldKind::String)),
        )];
        let invoker = Arc::new(ScriptedInvoker::new().respond("c", "```json {\"category\": \"billing\"} ```"));

        let run = run(&stages, "refund please", invoker).await.unwrap();

        assert_run_completed(&run);
        assert_eq!(run.stage_results[0].structured.as_ref().unwrap()["category"], "billing");
        assert_eq!(run.final_output(), Some("```json {\"category\": \"billing\"} ```"));
    }

    #[tokio::test]
    async fn test_concurrent_runs_are_independent() {
        let invoker = FnInvoker::new("echo", |identity: AgentIdentity, prompt: String| async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok::<_, InvokeError>(Invocation::text(format!("[{}] {prompt}", identity.name)))
        });
        let pipeline = Pipeline::builder("independent")
            .stages(relay_stages(3))
            .invoker(Arc::new(invoker))
            .build()
            .unwrap();

        let (left, right) = tokio::join!(pipeline.run("left input"), pipeline.run("right input"));

        assert_run_completed(&left);
        assert_run_completed(&right);
        assert_ne!(left.run_id, right.run_id);
        for output in left.stage_outputs() {
            assert!(output.contains("left input") && !output.contains("right"));
        }
        for output in right.stage_outputs() {
            assert!(output.contains("right input") && !output.contains("left"));
        }
    }

    #[tokio::test]
    async fn test_batch_survives_failed_runs() {
        let invoker = FnInvoker::new("picky", |_identity: AgentIdentity, prompt: String| async move {
            if prompt.contains("poison") {
                Err(InvokeError::Transport("refused".into()))
            } else {
                Ok(Invocation::text(prompt))
            }
        });
        let pipeline = Pipeline::builder("batch")
            .stages(relay_stages(2))
            .invoker(Arc::new(invoker))
            .build()
            .unwrap();

        let runs = run_batch(&pipeline, ["ok-1", "poison", "ok-2", "ok-3"], 3).await;

        let statuses: Vec<RunStatus> = runs.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                RunStatus::Completed,
                RunStatus::Failed,
                RunStatus::Completed,
                RunStatus::Completed,
            ]
        );
        assert_eq!(runs[3].final_output(), Some("ok-3"));
    }

    #[tokio::test]
    async fn test_cancel_between_stages() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        let invoker = FnInvoker::new("cancelling", move |identity: AgentIdentity, _prompt: String| {
            let trigger = trigger.clone();
            async move {
                if identity.name == "a" {
                    trigger.cancel("operator stop");
                }
                Ok::<_, InvokeError>(Invocation::text(format!("{} done", identity.name)))
            }
        });
        let sink = Arc::new(CollectingEventSink::new());
        let executor = SequentialExecutor::new(Arc::new(invoker)).with_event_sink(sink.clone());

        let run = executor
            .run_with_cancellation(&three_stages(), "input", &token)
            .await
            .unwrap();

        assert_eq!(run.status, RunStatus::Failed);
        assert_stage_outputs(&run, &["a done"]);
        assert_eq!(run.failed_stage(), None);
        assert_eq!(run.error.unwrap().message, "cancelled: operator stop");
        assert_eq!(sink.events_of_type("run.cancelled").len(), 1);
    }

    #[tokio::test]
    async fn test_retry_reruns_whole_pipeline() {
        let scripted = ScriptedInvoker::new()
            .respond("a", "a out")
            .fail("b", InvokeError::Timeout(Duration::from_secs(1)))
            .respond("b", "b out")
            .respond("c", "c out");
        let recorder = Arc::new(RecordingInvoker::new(Arc::new(scripted)));
        let sink = Arc::new(CollectingEventSink::new());
        let pipeline = Pipeline::builder("flaky")
            .stages(three_stages())
            .invoker(recorder.clone())
            .event_sink(sink.clone())
            .build()
            .unwrap();

        let run = pipeline.run_with_retry("input", &no_wait_retry(2)).await;

        assert_run_completed(&run);
        assert_eq!(run.attempt, 2);
        assert_eq!(recorder.identity_names(), vec!["a", "b", "a", "b", "c"]);
        assert_eq!(sink.events_of_type("run.retrying").len(), 1);
    }

    #[tokio::test]
    async fn test_retry_exhausted_returns_last_failure() {
        let invoker = Arc::new(FailingInvoker::transport("down"));
        let pipeline = Pipeline::builder("down")
            .stages(three_stages())
            .invoker(invoker.clone())
            .build()
            .unwrap();

        let run = pipeline.run_with_retry("input", &no_wait_retry(2)).await;

        assert_run_failed_at(&run, "a");
        assert_eq!(run.attempt, 3);
        assert_eq!(invoker.call_count(), 3);
    }

    #[tokio::test]
    async fn test_cancelled_run_is_not_retried() {
        let invoker = Arc::new(FailingInvoker::transport("down"));
        let pipeline = Pipeline::builder("cancelled")
            .stages(three_stages())
            .invoker(invoker.clone())
            .build()
            .unwrap();
        let token = CancellationToken::new();
        token.cancel("shutdown");

        let run =
            run_with_retry_and_cancellation(&pipeline, "input", &no_wait_retry(5), &token).await;

        assert_eq!(run.attempt, 1);
        assert_eq!(invoker.call_count(), 0);
        assert!(run.error.unwrap().message.contains("shutdown"));
    }

    #[tokio::test]
    async fn test_run_serializes_to_json() {
        let invoker = Arc::new(
            ScriptedInvoker::new()
                .respond("a", "first")
                .fail("b", InvokeError::Transport("gone".into())),
        );
        let run = run(&three_stages(), "input", invoker).await.unwrap();

        let value: serde_json::Value = serde_json::from_str(&run.to_json().unwrap()).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["error"]["stage"], "b");
        assert_eq!(value["stage_results"].as_array().unwrap().len(), 2);
        assert_eq!(value["stage_results"][1]["error"]["kind"], "invocation");
    }
}
