//! Structured agent outputs and decoding of raw model text into them.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::AgentError;

/// What the resolution agent decided to do with the conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReplyCategory {
    Solution,
    Question,
}

impl ReplyCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Solution => "solution",
            Self::Question => "question",
        }
    }
}

/// Resolution agent output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentReply {
    pub category: ReplyCategory,
    pub content: String,
}

/// Drafting agent output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TicketDraft {
    pub title: String,
    pub description: String,
}

/// Strip a surrounding Markdown code fence, if any.
fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let Some(body) = rest.trim_end().strip_suffix("```") else {
        return text;
    };
    // Drop the info string (`json`, `JSON`, ...) on the opening line.
    match body.split_once('\n') {
        Some((info, inner)) if !info.trim_start().starts_with('{') => inner.trim(),
        _ => body.trim(),
    }
}

/// Locate the JSON object in raw model text.
fn extract_object(raw: &str) -> Option<serde_json::Map<String, serde_json::Value>> {
    let text = strip_code_fence(raw.trim());

    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str(text) {
        return Some(map);
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str(&text[start..=end]) {
        Ok(serde_json::Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Decode raw model text into the agent's output type.
///
/// Text that holds no JSON object is a generation failure; an object that
/// does not fit `T` (missing field, value outside a closed set) is malformed
/// output. Nothing is coerced.
pub fn decode_output<T: DeserializeOwned>(raw: &str) -> Result<T, AgentError> {
    let object = extract_object(raw).ok_or_else(|| {
        AgentError::Generation("model output is not a JSON object".to_string())
    })?;

    serde_json::from_value(serde_json::Value::Object(object))
        .map_err(|e| AgentError::Malformed(e.to_string()))
}
