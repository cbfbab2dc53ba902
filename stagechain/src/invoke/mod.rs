//! The invocation boundary.
//!
//! The executor's only outward call is [`Invoker::invoke`]: send a rendered
//! prompt, with the stage's identity, to a model/agent and get text back.
//! Everything behind it (reasoning, tool use, web search) is opaque.

mod boundary;
#[cfg(feature = "http")]
mod http;

pub use boundary::{invoke_stage, AcceptedOutput, BoundaryError};
#[cfg(feature = "http")]
pub use http::OpenAiCompatibleInvoker;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use crate::stages::AgentIdentity;

/// Errors returned by an invoker.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvokeError {
    /// The request never reached the provider, or the connection failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The provider answered with an error.
    #[error("provider error (status {status}): {message}")]
    Provider {
        /// HTTP (or provider-specific) status code.
        status: u16,
        /// Provider error message.
        message: String,
    },

    /// The call did not finish in time.
    #[error("invocation timed out after {0:?}")]
    Timeout(Duration),

    /// The provider answered, but the payload was unusable.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The call was cancelled.
    #[error("invocation cancelled: {0}")]
    Cancelled(String),
}

/// A successful model/agent response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    /// Response text.
    pub text: String,
    /// Model that produced the text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Prompt tokens, if reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u32>,
    /// Completion tokens, if reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u32>,
    /// Provider-side latency, if measured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
}

impl Invocation {
    /// A response holding only text.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Sets the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Returns total tokens.
    #[must_use]
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens
            .unwrap_or(0)
            .saturating_add(self.output_tokens.unwrap_or(0))
    }

    /// Span/log attributes describing this response.
    #[must_use]
    pub fn to_attributes(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        if let Some(ref m) = self.model {
            map.insert("llm.model".to_string(), serde_json::json!(m));
        }
        if let Some(t) = self.input_tokens {
            map.insert("llm.input_tokens".to_string(), serde_json::json!(t));
        }
        if let Some(t) = self.output_tokens {
            map.insert("llm.output_tokens".to_string(), serde_json::json!(t));
        }
        map.insert("llm.total_tokens".to_string(), serde_json::json!(self.total_tokens()));
        if let Some(l) = self.latency_ms {
            map.insert("llm.latency_ms".to_string(), serde_json::json!(l));
        }
        map
    }
}

/// Sends a prompt to a model/agent on behalf of a stage.
///
/// Implementations may be slow and may fail; the executor calls `invoke`
/// exactly once per stage and never retries it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Invoker: Send + Sync + Debug {
    /// Invokes the model with the stage identity and rendered prompt.
    async fn invoke(&self, identity: &AgentIdentity, prompt: &str) -> Result<Invocation, InvokeError>;
}

/// An invoker backed by an async closure.
pub struct FnInvoker<F, Fut>
where
    F: Fn(AgentIdentity, String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Invocation, InvokeError>> + Send,
{
    name: String,
    func: F,
}

impl<F, Fut> FnInvoker<F, Fut>
where
    F: Fn(AgentIdentity, String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Invocation, InvokeError>> + Send,
{
    /// Creates a new closure-backed invoker.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F, Fut> Debug for FnInvoker<F, Fut>
where
    F: Fn(AgentIdentity, String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Invocation, InvokeError>> + Send,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnInvoker").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F, Fut> Invoker for FnInvoker<F, Fut>
where
    F: Fn(AgentIdentity, String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Invocation, InvokeError>> + Send,
{
    async fn invoke(&self, identity: &AgentIdentity, prompt: &str) -> Result<Invocation, InvokeError> {
        (self.func)(identity.clone(), prompt.to_string()).await
    }
}
