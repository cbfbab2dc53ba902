//! Independent runs executed concurrently.

use futures::stream::{self, StreamExt};
use tracing::info;

use super::Pipeline;
use crate::core::PipelineRun;

/// Runs `pipeline` once per input, up to `concurrency` runs at a time.
///
/// Results come back in input order. Runs share nothing but the pipeline
/// definition, so a failure in one never affects another. A concurrency of
/// 0 is treated as 1.
pub async fn run_batch<I, S>(pipeline: &Pipeline, inputs: I, concurrency: usize) -> Vec<PipelineRun>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let inputs: Vec<String> = inputs.into_iter().map(Into::into).collect();
    let concurrency = concurrency.max(1);

    info!(
        pipeline = %pipeline.name(),
        runs = inputs.len(),
        concurrency,
        "Starting batch"
    );

    let runs: Vec<PipelineRun> = stream::iter(inputs)
        .map(|input| async move { pipeline.run(&input).await })
        .buffered(concurrency)
        .collect()
        .await;

    let failed = runs.iter().filter(|r| !r.is_success()).count();
    info!(
        pipeline = %pipeline.name(),
        runs = runs.len(),
        failed,
        "Batch finished"
    );
    runs
}
