//! Fixed agent instructions and transcript rendering.

use crate::sessions::Turn;

pub const RESOLUTION_SYSTEM_PROMPT: &str = r#"You are a helpful support agent. Your goal is to resolve user queries.

You must respond with a JSON object containing:
- "category": either "solution" or "question"
- "content": your response text

Example:
{"category": "question", "content": "Please describe the errors you see on your console."}

If you can provide a direct solution, use category "solution" and give clear, step-by-step instructions.
If you need more information, use category "question" and ask specific, clarifying questions.

Be as detailed and thorough as possible in both solutions and questions."#;

pub const DRAFTING_SYSTEM_PROMPT: &str = r#"You are a helpful support agent. Your job is to draft a ticket title and description using the conversation provided.

You must respond with a JSON object containing:
- "title": the title of the ticket
- "description": a description of the problem and the solutions that were already explored

Example:
{"title": "Email login issue", "description": "User cannot log in with their email address. Suggested trying another address and a password reset; neither worked."}"#;

const RESOLUTION_PREFIX: &str = "solve the user query using this feedback :";
const DRAFTING_PREFIX: &str = "draft a ticket based on this context";

/// Serialize the transcript verbatim and in order.
pub fn render_transcript(history: &[Turn]) -> String {
    // Turn is plain strings and a unit enum; serializing cannot fail.
    serde_json::to_string(history).unwrap_or_else(|_| "[]".to_string())
}

pub fn resolution_prompt(history: &[Turn]) -> String {
    format!("{RESOLUTION_PREFIX}{}", render_transcript(history))
}

pub fn drafting_prompt(history: &[Turn]) -> String {
    format!("{DRAFTING_PREFIX}{}", render_transcript(history))
}
