//! Prompt templates with a named slot for prior context.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Placeholder replaced by prior stage output (or the initial input for the first stage).
pub const CONTEXT_PLACEHOLDER: &str = "{context}";

/// Placeholder replaced by the run's initial input in any stage.
pub const INPUT_PLACEHOLDER: &str = "{input}";

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{(context|input)\}").expect("static placeholder pattern"))
}

/// A prompt template.
///
/// Rendering is a single pass over the template text, so placeholder-like
/// text inside the substituted values is never expanded again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptTemplate {
    text: String,
}

impl PromptTemplate {
    /// Creates a template from text.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Returns the raw template text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Returns true if the template contains `{context}`.
    #[must_use]
    pub fn has_context_placeholder(&self) -> bool {
        self.text.contains(CONTEXT_PLACEHOLDER)
    }

    /// Returns true if the template contains `{input}`.
    #[must_use]
    pub fn has_input_placeholder(&self) -> bool {
        self.text.contains(INPUT_PLACEHOLDER)
    }

    /// Substitutes `{context}` and `{input}`.
    #[must_use]
    pub fn render(&self, context: &str, input: &str) -> String {
        placeholder_regex()
            .replace_all(&self.text, |caps: &Captures<'_>| match &caps[1] {
                "context" => context.to_string(),
                _ => input.to_string(),
            })
            .into_owned()
    }
}

impl From<&str> for PromptTemplate {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for PromptTemplate {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}
