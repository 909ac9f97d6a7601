//! Generic OpenAI-compatible provider.
//! OpenAI, OpenRouter and Portkey all accept the same `/chat/completions`
//! request, including `response_format` with a JSON schema, so one client
//! covers every supported backend.

use crate::providers::traits::{GenerationRequest, OutputSchema, Provider};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A provider that speaks the OpenAI-compatible chat completions API.
pub struct OpenAiCompatibleProvider {
    pub(crate) name: String,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
    pub(crate) auth_header: AuthStyle,
    client: Client,
}

/// How the provider expects the API key to be sent.
#[derive(Debug, Clone)]
pub enum AuthStyle {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// Custom header name (Portkey uses `x-portkey-api-key`)
    Custom(String),
}

impl OpenAiCompatibleProvider {
    pub fn new(
        name: &str,
        base_url: &str,
        api_key: Option<&str>,
        auth_style: AuthStyle,
        timeout: Duration,
    ) -> Self {
        Self {
            name: name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.map(ToString::to_string),
            auth_header: auth_style,
            client: Client::builder()
                .timeout(timeout)
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    /// Build the full URL for chat completions, detecting if base_url already includes the path.
    fn chat_completions_url(&self) -> String {
        let has_full_endpoint = reqwest::Url::parse(&self.base_url)
            .map(|url| {
                url.path()
                    .trim_end_matches('/')
                    .ends_with("/chat/completions")
            })
            .unwrap_or_else(|_| self.base_url.ends_with("/chat/completions"));

        if has_full_endpoint {
            self.base_url.clone()
        } else {
            format!("{}/chat/completions", self.base_url)
        }
    }

    fn apply_auth_header(
        &self,
        req: reqwest::RequestBuilder,
        api_key: &str,
    ) -> reqwest::RequestBuilder {
        match &self.auth_header {
            AuthStyle::Bearer => req.header("Authorization", format!("Bearer {api_key}")),
            AuthStyle::Custom(header) => req.header(header, api_key),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f64,
    response_format: ResponseFormat<'a>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: JsonSchemaFormat<'a>,
}

#[derive(Debug, Serialize)]
struct JsonSchemaFormat<'a> {
    name: &'a str,
    schema: &'a serde_json::Value,
    strict: bool,
}

impl<'a> ResponseFormat<'a> {
    fn from_schema(schema: &'a OutputSchema) -> Self {
        Self {
            kind: "json_schema",
            json_schema: JsonSchemaFormat {
                name: &schema.name,
                schema: &schema.schema,
                strict: true,
            },
        }
    }
}

fn build_chat_request<'a>(request: &GenerationRequest<'a>) -> ChatRequest<'a> {
    ChatRequest {
        model: request.model,
        messages: vec![
            Message {
                role: "system",
                content: request.system_prompt,
            },
            Message {
                role: "user",
                content: request.user_prompt,
            },
        ],
        temperature: request.temperature,
        response_format: ResponseFormat::from_schema(request.output_schema),
        stream: false,
    }
}

#[derive(Debug, Deserialize)]
struct ApiChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

fn extract_content(response: ApiChatResponse, provider: &str) -> anyhow::Result<String> {
    let Some(choice) = response.choices.into_iter().next() else {
        anyhow::bail!("No response from {provider}");
    };

    if let Some(refusal) = choice.message.refusal.filter(|r| !r.trim().is_empty()) {
        anyhow::bail!(
            "{provider} refused the request: {}",
            super::sanitize_api_error(&refusal)
        );
    }

    choice
        .message
        .content
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| anyhow::anyhow!("Empty response from {provider}"))
}

#[async_trait]
impl Provider for OpenAiCompatibleProvider {
    async fn generate(&self, request: GenerationRequest<'_>) -> anyhow::Result<String> {
        let api_key = self.api_key.as_ref().ok_or_else(|| {
            anyhow::anyhow!(
                "{} API key not set. Set api_key in config.toml or SUPPORTDESK_API_KEY.",
                self.name
            )
        })?;

        let body = build_chat_request(&request);
        let url = self.chat_completions_url();

        let response = self
            .apply_auth_header(self.client.post(&url).json(&body), api_key)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    anyhow::anyhow!("{} request timed out", self.name)
                } else {
                    anyhow::anyhow!("{} request failed: {e}", self.name)
                }
            })?;

        if !response.status().is_success() {
            return Err(super::api_error(&self.name, response).await);
        }

        let chat_response: ApiChatResponse = response.json().await?;
        extract_content(chat_response, &self.name)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
