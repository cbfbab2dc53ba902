//! Assertions over finished runs.

use super::RecordingInvoker;
use crate::core::{PipelineRun, RunStatus};

/// Asserts every stage succeeded.
pub fn assert_run_completed(run: &PipelineRun) {
    assert_eq!(
        run.status,
        RunStatus::Completed,
        "Expected run to complete, got {} (error: {:?})",
        run.status,
        run.error
    );
}

/// Asserts the run halted at `stage`, keeping every result up to and
/// including it and nothing after.
pub fn assert_run_failed_at(run: &PipelineRun, stage: &str) {
    assert_eq!(
        run.status,
        RunStatus::Failed,
        "Expected run to fail at '{}', got status {}",
        stage,
        run.status
    );
    assert_eq!(
        run.failed_stage(),
        Some(stage),
        "Expected failure at '{}', got {:?}",
        stage,
        run.error
    );
    let last = run.stage_results.last().map(|r| r.stage_name.as_str());
    assert_eq!(
        last,
        Some(stage),
        "Expected '{stage}' to be the last recorded result, got {last:?}"
    );
}

/// Asserts the successful outputs, in order.
pub fn assert_stage_outputs(run: &PipelineRun, expected: &[&str]) {
    assert_eq!(
        run.stage_outputs(),
        expected,
        "Stage outputs did not match for run {}",
        run.run_id
    );
}

/// Asserts call number `index` carried exactly `prompt`.
pub fn assert_prompt_sent(invoker: &RecordingInvoker, index: usize, prompt: &str) {
    let prompts = invoker.prompts();
    assert!(
        index < prompts.len(),
        "Expected at least {} calls, got {}",
        index + 1,
        prompts.len()
    );
    assert_eq!(prompts[index], prompt, "Prompt #{index} did not match");
}
