//! One stage call: invoke, time-box, reject empty text, validate shape.

use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

use super::{InvokeError, Invoker};
use crate::core::{StageError, StageErrorKind};
use crate::errors::{StageInvocationError, StageOutputEmptyError};
use crate::schema::SchemaViolation;
use crate::stages::Stage;

/// Output the boundary accepted on behalf of the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedOutput {
    /// Response text, unmodified.
    pub text: String,
    /// Validated structured value, when the stage declares a schema.
    pub structured: Option<serde_json::Value>,
    /// Model reported by the invoker.
    pub model: Option<String>,
}

/// Why the boundary rejected a stage call.
#[derive(Debug, Error)]
pub enum BoundaryError {
    /// The call itself failed (including timeouts).
    #[error(transparent)]
    Invocation(#[from] StageInvocationError),

    /// The call returned blank text.
    #[error(transparent)]
    Empty(#[from] StageOutputEmptyError),

    /// The text did not match the stage's declared shape.
    #[error("Stage '{stage}' output rejected by schema '{schema}': {violation}")]
    Schema {
        /// The stage.
        stage: String,
        /// The schema name.
        schema: String,
        /// What was wrong.
        violation: SchemaViolation,
    },
}

impl BoundaryError {
    /// The stage this error belongs to.
    #[must_use]
    pub fn stage(&self) -> &str {
        match self {
            Self::Invocation(e) => &e.stage,
            Self::Empty(e) => &e.stage,
            Self::Schema { stage, .. } => stage,
        }
    }

    /// Converts to the error recorded on a `StageResult`.
    #[must_use]
    pub fn to_stage_error(&self) -> StageError {
        let kind = match self {
            Self::Invocation(e) if matches!(e.source, InvokeError::Timeout(_)) => {
                StageErrorKind::Timeout
            }
            Self::Invocation(_) => StageErrorKind::Invocation,
            Self::Empty(_) => StageErrorKind::EmptyOutput,
            Self::Schema { .. } => StageErrorKind::SchemaViolation,
        };
        StageError::new(kind, self.to_string())
    }
}

/// Calls the invoker for one stage and decides whether its output is usable.
///
/// A timeout is reported as [`InvokeError::Timeout`]; blank text as
/// [`StageOutputEmptyError`]; a schema mismatch as [`BoundaryError::Schema`].
pub async fn invoke_stage(
    invoker: &dyn Invoker,
    stage: &Stage,
    prompt: &str,
    timeout: Option<Duration>,
) -> Result<AcceptedOutput, BoundaryError> {
    let start = Instant::now();
    let call = invoker.invoke(&stage.agent_identity, prompt);

    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(r) => r,
            Err(_) => Err(InvokeError::Timeout(limit)),
        },
        None => call.await,
    };

    let invocation = result.map_err(|e| StageInvocationError::new(&stage.name, e))?;

    debug!(
        stage = %stage.name,
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        total_tokens = invocation.total_tokens(),
        "Invocation returned"
    );

    if invocation.text.trim().is_empty() {
        return Err(StageOutputEmptyError::new(&stage.name).into());
    }

    let structured = match stage.output_schema {
        Some(ref schema) => Some(schema.validate(&invocation.text).map_err(|violation| {
            BoundaryError::Schema {
                stage: stage.name.clone(),
                schema: schema.name.clone(),
                violation,
            }
        })?),
        None => None,
    };

    Ok(AcceptedOutput {
        text: invocation.text,
        structured,
        model: invocation.model,
    })
}
