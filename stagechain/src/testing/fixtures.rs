//! Stage fixtures for common pipeline shapes.

use crate::stages::{AgentIdentity, Stage};

/// A stage whose identity has the same name as the stage.
#[must_use]
pub fn test_stage(name: &str, template: &str) -> Stage {
    Stage::new(name, AgentIdentity::new(name), template)
}

/// Two stages: summarize a log, then rewrite the summary as one sentence.
#[must_use]
pub fn summarizer_formatter_stages() -> Vec<Stage> {
    vec![
        Stage::new(
            "summarizer",
            AgentIdentity::new("summarizer")
                .with_role("Technical Summarizer")
                .with_goal("Condense raw input into a short summary"),
            "Summarize: {context}",
        ),
        Stage::new(
            "formatter",
            AgentIdentity::new("formatter")
                .with_role("Copy Editor")
                .with_goal("Produce one polished sentence"),
            "Rewrite as one sentence: {context}",
        ),
    ]
}

/// `count` stages named `stage-0..` that pass their context straight on.
#[must_use]
pub fn relay_stages(count: usize) -> Vec<Stage> {
    (0..count)
        .map(|i| test_stage(&format!("stage-{i}"), "{context}"))
        .collect()
}
