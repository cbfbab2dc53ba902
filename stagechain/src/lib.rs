//! # Stagechain
//!
//! Sequential multi-agent pipelines with explicit context handoff.
//!
//! A pipeline is an ordered list of stages. Each stage pairs an agent
//! identity with a prompt template containing a `{context}` slot; the
//! executor renders that slot from the initial input (first stage) or from
//! earlier outputs (later stages), sends the prompt through an [`Invoker`],
//! and records the result. Stages run strictly in order, and the first
//! failure halts the run with everything before it preserved.
//!
//! - **Explicit data flow**: every prompt sent is recorded on the run
//! - **Fail fast**: invalid pipelines are rejected before any invocation
//! - **Whole-run retry**: retries restart from stage 0, never mid-pipeline
//! - **Cooperative cancellation**: checked before every stage
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stagechain::prelude::*;
//!
//! let pipeline = PipelineBuilder::new("changelog")
//!     .stage(Stage::new("summarizer", AgentIdentity::new("summarizer"), "Summarize: {context}"))
//!     .stage(Stage::new("formatter", AgentIdentity::new("formatter"), "Rewrite as one sentence: {context}"))
//!     .invoker(Arc::new(OpenAiCompatibleInvoker::new(config.provider)?))
//!     .build()?;
//!
//! let run = pipeline.run("raw log: X; Y").await;
//! println!("{}", run.to_json_pretty()?);
//! ```
//!
//! [`Invoker`]: crate::invoke::Invoker

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod invoke;
pub mod observability;
pub mod pipeline;
pub mod schema;
pub mod stages;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{ExecutorConfig, LoggingConfig, ProviderConfig, StagechainConfig};
    pub use crate::core::{PipelineRun, RunError, RunStatus, StageError, StageErrorKind, StageResult};
    pub use crate::errors::{
        ConfigError, ErrorInfo, PipelineConfigurationError, StageInvocationError,
        StageOutputEmptyError, StagechainError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    #[cfg(feature = "http")]
    pub use crate::invoke::OpenAiCompatibleInvoker;
    pub use crate::invoke::{FnInvoker, Invocation, InvokeError, Invoker};
    pub use crate::observability::init_tracing;
    pub use crate::pipeline::{
        run_batch, run_with_retry, BackoffStrategy, ContextMode, Pipeline, PipelineBuilder,
        RetryPolicy, SequentialExecutor,
    };
    pub use crate::schema::{FieldKind, FieldSpec, OutputSchema, SchemaViolation};
    pub use crate::stages::{AgentIdentity, PromptTemplate, Stage};
    pub use crate::utils::{generate_uuid, iso_timestamp, Timestamp};
}
