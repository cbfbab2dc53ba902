//! Invokers for tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::invoke::{Invocation, InvokeError, Invoker};
use crate::stages::AgentIdentity;

type Scripted = Result<Invocation, InvokeError>;

/// Answers by identity name from pre-scripted queues.
///
/// Each identity's responses are consumed in order; the last one repeats.
/// An identity with no script gets [`InvokeError::InvalidResponse`].
#[derive(Debug, Default)]
pub struct ScriptedInvoker {
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: AtomicUsize,
}

impl ScriptedInvoker {
    /// Creates an invoker with no scripts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a text response for `identity`.
    #[must_use]
    pub fn respond(self, identity: impl Into<String>, text: impl Into<String>) -> Self {
        self.push(identity.into(), Ok(Invocation::text(text)));
        self
    }

    /// Queues an error for `identity`.
    #[must_use]
    pub fn fail(self, identity: impl Into<String>, error: InvokeError) -> Self {
        self.push(identity.into(), Err(error));
        self
    }

    /// Total number of invocations.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn push(&self, identity: String, response: Scripted) {
        self.scripts.lock().entry(identity).or_default().push_back(response);
    }
}

#[async_trait]
impl Invoker for ScriptedInvoker {
    async fn invoke(&self, identity: &AgentIdentity, _prompt: &str) -> Result<Invocation, InvokeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut scripts = self.scripts.lock();
        let next = scripts.get_mut(&identity.name).and_then(|queue| {
            if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            }
        });
        next.unwrap_or_else(|| {
            Err(InvokeError::InvalidResponse(format!(
                "no scripted response for '{}'",
                identity.name
            )))
        })
    }
}

/// One call seen by a [`RecordingInvoker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Identity the stage was invoked with.
    pub identity: AgentIdentity,
    /// The literal prompt.
    pub prompt: String,
}

/// Records every `(identity, prompt)` pair, then delegates.
#[derive(Debug)]
pub struct RecordingInvoker {
    inner: Option<Arc<dyn Invoker>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl RecordingInvoker {
    /// Records calls and forwards them to `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn Invoker>) -> Self {
        Self {
            inner: Some(inner),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Records calls and answers `"<identity name> saw: <prompt>"`.
    #[must_use]
    pub fn echo() -> Self {
        Self {
            inner: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// All calls, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Prompts sent, in order.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.prompt.clone()).collect()
    }

    /// Identity names invoked, in order.
    #[must_use]
    pub fn identity_names(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.identity.name.clone()).collect()
    }

    /// Number of calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl Invoker for RecordingInvoker {
    async fn invoke(&self, identity: &AgentIdentity, prompt: &str) -> Result<Invocation, InvokeError> {
        self.calls.lock().push(RecordedCall {
            identity: identity.clone(),
            prompt: prompt.to_string(),
        });
        match self.inner {
            Some(ref inner) => inner.invoke(identity, prompt).await,
            None => Ok(Invocation::text(format!("{} saw: {}", identity.name, prompt))),
        }
    }
}

/// Always fails with the same error.
#[derive(Debug)]
pub struct FailingInvoker {
    error: InvokeError,
    calls: AtomicUsize,
}

impl FailingInvoker {
    /// Fails every call with `error`.
    #[must_use]
    pub fn new(error: InvokeError) -> Self {
        Self {
            error,
            calls: AtomicUsize::new(0),
        }
    }

    /// Fails every call with a transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(InvokeError::Transport(message.into()))
    }

    /// Number of calls attempted.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Invoker for FailingInvoker {
    async fn invoke(&self, _identity: &AgentIdentity, _prompt: &str) -> Result<Invocation, InvokeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

/// Sleeps before answering.
#[derive(Debug, Clone)]
pub struct SlowInvoker {
    delay: Duration,
    text: String,
}

impl SlowInvoker {
    /// Answers `text` after `delay`.
    #[must_use]
    pub fn new(delay: Duration, text: impl Into<String>) -> Self {
        Self {
            delay,
            text: text.into(),
        }
    }
}

#[async_trait]
impl Invoker for SlowInvoker {
    async fn invoke(&self, _identity: &AgentIdentity, _prompt: &str) -> Result<Invocation, InvokeError> {
        tokio::time::sleep(self.delay).await;
        Ok(Invocation::text(self.text.clone()))
    }
}

/// Succeeds with whitespace-only text.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyInvoker;

#[async_trait]
impl Invoker for EmptyInvoker {
    async fn invoke(&self, _identity: &AgentIdentity, _prompt: &str) -> Result<Invocation, InvokeError> {
        Ok(Invocation::text(" \n\t"))
    }
}
