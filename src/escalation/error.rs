use thiserror::Error;

use crate::agent::AgentError;

/// Every way handling one inbound message can fail.
///
/// None of these are recovered inside the controller; the caller sees the
/// failure and the user has to resend.
#[derive(Debug, Error)]
pub enum EscalationError {
    /// A session id was supplied but is not in the store.
    #[error("session not found: {0}")]
    SessionNotFound(String),
    /// The generation capability errored, timed out, or returned unusable text.
    #[error("generation failed: {0}")]
    GenerationFailure(String),
    /// The capability returned JSON with a missing or out-of-contract field.
    #[error("malformed agent output: {0}")]
    MalformedAgentOutput(String),
    /// The session store itself failed.
    #[error("session store error: {0}")]
    Store(String),
}

impl EscalationError {
    /// Stable machine-readable identifier for responses and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionNotFound(_) => "session_not_found",
            Self::GenerationFailure(_) => "generation_failure",
            Self::MalformedAgentOutput(_) => "malformed_agent_output",
            Self::Store(_) => "store_error",
        }
    }
}

impl From<AgentError> for EscalationError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Generation(message) => Self::GenerationFailure(message),
            AgentError::Malformed(message) => Self::MalformedAgentOutput(message),
        }
    }
}

impl From<anyhow::Error> for EscalationError {
    fn from(err: anyhow::Error) -> Self {
        Self::Store(format!("{err:#}"))
    }
}
