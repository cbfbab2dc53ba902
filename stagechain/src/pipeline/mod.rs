//! Pipeline building and execution.
//!
//! - [`SequentialExecutor`] runs stage lists in order
//! - [`PipelineBuilder`] validates a stage list into a reusable [`Pipeline`]
//! - [`run_with_retry`] re-runs failed pipelines from the first stage
//! - [`run_batch`] runs independent inputs concurrently

mod batch;
mod builder;
mod context;
mod executor;
mod retry;

#[cfg(test)]
mod integration_tests;

pub use batch::run_batch;
pub use builder::{Pipeline, PipelineBuilder};
pub use context::{build_context, ContextMode};
pub use executor::{run, validate_stages, SequentialExecutor, DEFAULT_PIPELINE_NAME};
pub use retry::{
    run_with_retry, run_with_retry_and_cancellation, BackoffStrategy, JitterStrategy, RetryPolicy,
};
