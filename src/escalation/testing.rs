//! Test doubles for the generation capability.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

use crate::providers::{GenerationRequest, Provider};

/// Provider double that replays queued outputs and records every call.
#[derive(Default)]
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String, String>>>,
    calls: Mutex<Vec<(String, String)>>,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn push_ok(&self, text: &str) -> &Self {
        self.replies.lock().push_back(Ok(text.to_string()));
        self
    }

    pub fn push_err(&self, message: &str) -> &Self {
        self.replies.lock().push_back(Err(message.to_string()));
        self
    }

    pub fn question(&self, content: &str) -> &Self {
        self.push_ok(&serde_json::json!({"category": "question", "content": content}).to_string())
    }

    pub fn solution(&self, content: &str) -> &Self {
        self.push_ok(&serde_json::json!({"category": "solution", "content": content}).to_string())
    }

    pub fn draft(&self, title: &str, description: &str) -> &Self {
        self.push_ok(
            &serde_json::json!({"title": title, "description": description}).to_string(),
        )
    }

    /// Output schema names of every call so far, in order.
    pub fn schemas(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(s, _)| s.clone()).collect()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.calls.lock().last().map(|(_, p)| p.clone())
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn generate(&self, request: GenerationRequest<'_>) -> anyhow::Result<String> {
        self.calls.lock().push((
            request.output_schema.name.clone(),
            request.user_prompt.to_string(),
        ));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.replies.lock().pop_front();
        match next {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(anyhow::anyhow!(message)),
            None => Err(anyhow::anyhow!("no scripted reply left")),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
