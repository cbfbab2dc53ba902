//! Lifecycle events emitted by the executor.
//!
//! Sinks are passed to the executor explicitly; there is no process-wide
//! sink. Event payloads are JSON objects that always carry `run_id` and
//! `pipeline`.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// Event type names.
pub mod event_types {
    /// A run (or retry attempt) began.
    pub const RUN_STARTED: &str = "run.started";
    /// A stage is about to be invoked.
    pub const STAGE_STARTED: &str = "stage.started";
    /// A stage's output was accepted.
    pub const STAGE_COMPLETED: &str = "stage.completed";
    /// A stage failed and the run halted.
    pub const STAGE_FAILED: &str = "stage.failed";
    /// Every stage succeeded.
    pub const RUN_COMPLETED: &str = "run.completed";
    /// The run halted on a failure.
    pub const RUN_FAILED: &str = "run.failed";
    /// The run was cancelled between stages.
    pub const RUN_CANCELLED: &str = "run.cancelled";
    /// A failed run is about to be retried.
    pub const RUN_RETRYING: &str = "run.retrying";
}
