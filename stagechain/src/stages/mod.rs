//! Stage definitions.
//!
//! A stage pairs an agent identity with a prompt template. Stages are
//! immutable once a pipeline is built.

mod identity;
mod template;

pub use identity::AgentIdentity;
pub use template::{PromptTemplate, CONTEXT_PLACEHOLDER, INPUT_PLACEHOLDER};

use serde::{Deserialize, Serialize};

use crate::errors::PipelineConfigurationError;
use crate::schema::OutputSchema;

/// An ordered unit of work in a sequential pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    /// Unique name within the pipeline.
    pub name: String,
    /// Template with a `{context}` slot.
    pub prompt_template: PromptTemplate,
    /// How the stage's agent should behave.
    pub agent_identity: AgentIdentity,
    /// Shape the stage's output must have, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<OutputSchema>,
}

impl Stage {
    /// Creates a new stage.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        agent_identity: AgentIdentity,
        prompt_template: impl Into<PromptTemplate>,
    ) -> Self {
        Self {
            name: name.into(),
            prompt_template: prompt_template.into(),
            agent_identity,
            output_schema: None,
        }
    }

    /// Declares a structured output shape.
    #[must_use]
    pub fn with_output_schema(mut self, schema: OutputSchema) -> Self {
        self.output_schema = Some(schema);
        self
    }

    /// Renders this stage's prompt.
    #[must_use]
    pub fn render_prompt(&self, context: &str, initial_input: &str) -> String {
        self.prompt_template.render(context, initial_input)
    }

    /// Validates the stage in isolation.
    pub fn validate(&self, index: usize) -> Result<(), PipelineConfigurationError> {
        if self.name.trim().is_empty() {
            return Err(PipelineConfigurationError::invalid_name(index));
        }
        if !self.prompt_template.has_context_placeholder() {
            return Err(PipelineConfigurationError::missing_placeholder(
                &self.name,
                CONTEXT_PLACEHOLDER,
            ));
        }
        Ok(())
    }
}
