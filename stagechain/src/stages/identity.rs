//! Agent identity: who a stage is and how it should behave.

use serde::{Deserialize, Serialize};

/// The role/instructions a stage's agent is given.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentIdentity {
    /// Display name (e.g. "Tech Lead").
    pub name: String,
    /// Role description (e.g. "Technical Summarizer").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// What the agent is trying to achieve.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    /// Free-form behavioural instructions.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub instructions: String,
    /// Per-agent model override, e.g. `openai/gpt-4o`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl AgentIdentity {
    /// Creates an identity with just a name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Sets the role.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Sets the goal.
    #[must_use]
    pub fn with_goal(mut self, goal: impl Into<String>) -> Self {
        self.goal = Some(goal.into());
        self
    }

    /// Sets the instructions.
    #[must_use]
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    /// Sets the model override.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Renders the identity as a system prompt.
    #[must_use]
    pub fn system_prompt(&self) -> String {
        let mut lines = vec![format!("You are {}.", self.name)];
        if let Some(ref role) = self.role {
            lines.push(format!("Role: {role}"));
        }
        if let Some(ref goal) = self.goal {
            lines.push(format!("Goal: {goal}"));
        }
        if !self.instructions.is_empty() {
            lines.push(String::new());
            lines.push(self.instructions.clone());
        }
        lines.join("\n")
    }
}
