//! What a stage sees as `{context}`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How prior outputs are handed to later stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextMode {
    /// Stage i sees only stage i-1's output.
    #[default]
    LastOnly,
    /// Stage i sees every prior output, joined in order.
    FullHistory,
}

impl ContextMode {
    /// Returns the config string for this mode.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::LastOnly => "last_only",
            Self::FullHistory => "full_history",
        }
    }
}

impl fmt::Display for ContextMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContextMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "last_only" | "last" => Ok(Self::LastOnly),
            "full_history" | "full" => Ok(Self::FullHistory),
            other => Err(format!(
                "unknown context mode '{other}' (expected last_only or full_history)"
            )),
        }
    }
}

/// Builds the `{context}` value for the next stage.
///
/// With no prior outputs this is the initial input. Outputs are passed
/// through verbatim: no trimming, no truncation.
#[must_use]
pub fn build_context(
    mode: ContextMode,
    separator: &str,
    initial_input: &str,
    prior_outputs: &[&str],
) -> String {
    match (mode, prior_outputs) {
        (_, []) => initial_input.to_string(),
        (ContextMode::LastOnly, [.., last]) => (*last).to_string(),
        (ContextMode::FullHistory, outputs) => outputs.join(separator),
    }
}
