use async_trait::async_trait;
use serde::Serialize;

/// JSON schema the model output is constrained to.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OutputSchema {
    /// Schema identifier sent to the backend (`[a-zA-Z0-9_-]`).
    pub name: String,
    pub schema: serde_json::Value,
}

impl OutputSchema {
    pub fn new(name: impl Into<String>, schema: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }
}

/// One structured generation call.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub system_prompt: &'a str,
    pub user_prompt: &'a str,
    pub output_schema: &'a OutputSchema,
    pub model: &'a str,
    pub temperature: f64,
}

/// Text-generation capability backing the support agents.
///
/// Returns the raw model text; decoding it into a typed result is the
/// caller's job. Transport failures, timeouts and non-success statuses are
/// all reported as errors.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn generate(&self, request: GenerationRequest<'_>) -> anyhow::Result<String>;

    fn name(&self) -> &str;
}
