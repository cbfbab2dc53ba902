//! Core domain model types for stagechain.
//!
//! This module contains the records a run produces:
//! - Run status and its state machine
//! - Per-stage results
//! - The pipeline run record itself

mod result;
mod run;
mod status;

pub use result::{StageError, StageErrorKind, StageResult};
pub use run::{PipelineRun, RunError};
pub use status::RunStatus;
