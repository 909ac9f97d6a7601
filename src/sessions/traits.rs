//! Session storage traits and types for escalation conversation state.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Speaker of a single transcript turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    System,
}

/// A single entry in a session transcript.
///
/// Serialized as `{"role": ..., "content": ...}`, which is also the shape fed
/// to the agents when the transcript is rendered into a prompt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// Where a session sits in the escalation protocol.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// The next inbound message starts a fresh resolution attempt.
    AttemptBoundary,
    /// A clarifying question is outstanding; the next message continues the attempt.
    AttemptInProgress,
    /// A ticket draft was produced; automated resolution is over for this session.
    Escalated,
}

/// A tracked escalation conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub attempt_count: u32,
    pub conversation_history: Vec<Turn>,
    pub new_attempt: bool,
    #[serde(default)]
    pub escalated: bool,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    /// A fresh session at the attempt boundary with no history.
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            attempt_count: 0,
            conversation_history: Vec::new(),
            new_attempt: true,
            escalated: false,
            created_at: now,
            last_activity: now,
        }
    }

    pub fn state(&self) -> SessionState {
        if self.escalated {
            SessionState::Escalated
        } else if self.new_attempt {
            SessionState::AttemptBoundary
        } else {
            SessionState::AttemptInProgress
        }
    }
}

/// Filter criteria for listing sessions.
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub escalated: Option<bool>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// Storage for escalation sessions.
///
/// Implementations only need to be consistent per call; per-session
/// read-modify-write exclusivity is enforced by the caller.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a freshly minted session. Fails if the id is already taken.
    async fn create(&self, session: Session) -> Result<Session>;

    /// Get an existing session by id, if it exists.
    async fn get(&self, session_id: &str) -> Result<Option<Session>>;

    /// Replace the stored copy of an existing session.
    async fn update(&self, session: &Session) -> Result<()>;

    /// List sessions matching the given filter, most recently active first.
    async fn list(&self, filter: &SessionFilter) -> Result<Vec<Session>>;

    /// Delete a session. Returns whether anything was removed.
    async fn delete(&self, session_id: &str) -> Result<bool>;

    /// The name of this session store implementation.
    fn name(&self) -> &str;
}
