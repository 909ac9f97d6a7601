//! Support agents: thin, schema-constrained wrappers over the generation capability.
//!
//! Both agents are values of [`AgentSpec`] ({name, system prompt, output
//! schema}) driven through the single [`run_agent`] function. They differ
//! only in that value and in the output type they decode to.

pub mod output;
pub mod prompt;

pub use output::{decode_output, AgentReply, ReplyCategory, TicketDraft};

use crate::providers::{sanitize_api_error, GenerationRequest, OutputSchema, Provider};
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Failure of a single agent invocation.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The capability errored, timed out, or produced no usable JSON.
    #[error("generation failed: {0}")]
    Generation(String),
    /// The capability produced JSON that does not satisfy the agent's contract.
    #[error("malformed agent output: {0}")]
    Malformed(String),
}

/// Model selection shared by every agent call.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    pub model: String,
    pub temperature: f64,
}

/// Fixed identity of one agent.
#[derive(Debug, Clone)]
pub struct AgentSpec {
    pub name: &'static str,
    pub system_prompt: &'static str,
    pub output_schema: OutputSchema,
}

impl AgentSpec {
    /// Answers the user or asks a clarifying question.
    pub fn resolution() -> Self {
        Self {
            name: "resolution",
            system_prompt: prompt::RESOLUTION_SYSTEM_PROMPT,
            output_schema: OutputSchema::new(
                "agent_reply",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "category": {
                            "type": "string",
                            "enum": ["solution", "question"],
                            "description": "The type of response to return"
                        },
                        "content": {
                            "type": "string",
                            "description": "The solution to the query or clarifying question(s) to the user"
                        }
                    },
                    "required": ["category", "content"],
                    "additionalProperties": false
                }),
            ),
        }
    }

    /// Turns a transcript into a ticket title and description.
    pub fn drafting() -> Self {
        Self {
            name: "drafting",
            system_prompt: prompt::DRAFTING_SYSTEM_PROMPT,
            output_schema: OutputSchema::new(
                "ticket_draft",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "title": {
                            "type": "string",
                            "description": "Suggested ticket title"
                        },
                        "description": {
                            "type": "string",
                            "description": "Suggested description of the ticket"
                        }
                    },
                    "required": ["title", "description"],
                    "additionalProperties": false
                }),
            ),
        }
    }
}

/// Invoke the generation capability for `agent` and decode the result.
///
/// Zero retries: any failure is returned to the caller immediately.
pub async fn run_agent<T: DeserializeOwned>(
    provider: &dyn Provider,
    agent: &AgentSpec,
    settings: &ModelSettings,
    user_prompt: &str,
) -> Result<T, AgentError> {
    let raw = provider
        .generate(GenerationRequest {
            system_prompt: agent.system_prompt,
            user_prompt,
            output_schema: &agent.output_schema,
            model: &settings.model,
            temperature: settings.temperature,
        })
        .await
        .map_err(|e| AgentError::Generation(sanitize_api_error(&format!("{e:#}"))))?;

    tracing::debug!(agent = agent.name, bytes = raw.len(), "agent output received");

    decode_output(&raw)
}
