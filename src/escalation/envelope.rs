use serde::Serialize;

use crate::agent::{AgentReply, ReplyCategory, TicketDraft};

/// Category-tagged payload of a response envelope.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "category", content = "content", rename_all = "snake_case")]
pub enum EnvelopeBody {
    Question(String),
    Solution(String),
    TicketDraft(TicketDraft),
}

/// Response to one inbound message.
///
/// Serializes flat: `{"session_id": ..., "category": ..., "content": ...}`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Envelope {
    pub session_id: String,
    #[serde(flatten)]
    pub body: EnvelopeBody,
}

impl Envelope {
    pub fn reply(session_id: impl Into<String>, reply: AgentReply) -> Self {
        let body = match reply.category {
            ReplyCategory::Question => EnvelopeBody::Question(reply.content),
            ReplyCategory::Solution => EnvelopeBody::Solution(reply.content),
        };
        Self {
            session_id: session_id.into(),
            body,
        }
    }

    pub fn ticket_draft(session_id: impl Into<String>, draft: TicketDraft) -> Self {
        Self {
            session_id: session_id.into(),
            body: EnvelopeBody::TicketDraft(draft),
        }
    }

    pub fn category(&self) -> &'static str {
        match self.body {
            EnvelopeBody::Question(_) => "question",
            EnvelopeBody::Solution(_) => "solution",
            EnvelopeBody::TicketDraft(_) => "ticket_draft",
        }
    }
}
