//! Testing utilities for stagechain pipelines.
//!
//! This module provides:
//! - Invokers that script, record, fail, stall or return nothing
//! - Assertions over finished runs
//! - Stage fixtures for common pipeline shapes

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{assert_prompt_sent, assert_run_completed, assert_run_failed_at, assert_stage_outputs};
pub use fixtures::{relay_stages, summarizer_formatter_stages, test_stage};
pub use mocks::{
    EmptyInvoker, FailingInvoker, RecordedCall, RecordingInvoker, ScriptedInvoker, SlowInvoker,
};
