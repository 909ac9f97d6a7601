//! Provider subsystem for the generation capability.
//!
//! Every backend implements [`Provider`] and is constructed by name through
//! [`create_provider`]. All supported backends speak the OpenAI-compatible
//! chat completions protocol, so they share [`OpenAiCompatibleProvider`] and
//! differ only in base URL and auth header.

pub mod compatible;
pub mod traits;

pub use compatible::{AuthStyle, OpenAiCompatibleProvider};
pub use traits::{GenerationRequest, OutputSchema, Provider};

use std::time::Duration;

const MAX_API_ERROR_CHARS: usize = 200;

const REDACTED: &str = "[REDACTED]";

/// Token prefixes that mark provider credentials in error bodies.
const SECRET_PREFIXES: [&str; 4] = ["sk-", "pk-", "xoxb-", "ghp_"];

fn is_secret_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')
}

/// Redact credential-looking tokens (`sk-…`, `pk-…`, …) from provider error text.
pub fn scrub_secret_patterns(input: &str) -> String {
    let mut scrubbed = input.to_string();

    for prefix in SECRET_PREFIXES {
        let mut cursor = 0;
        while let Some(rel) = scrubbed[cursor..].find(prefix) {
            let start = cursor + rel;
            let body_start = start + prefix.len();
            let body_len: usize = scrubbed[body_start..]
                .chars()
                .take_while(|c| is_secret_char(*c))
                .map(char::len_utf8)
                .sum();

            if body_len == 0 {
                cursor = body_start;
                continue;
            }

            scrubbed.replace_range(start..body_start + body_len, REDACTED);
            cursor = start + REDACTED.len();
        }
    }

    scrubbed
}

/// Sanitize API error text by scrubbing secrets and truncating length.
pub fn sanitize_api_error(input: &str) -> String {
    let scrubbed = scrub_secret_patterns(input);

    if scrubbed.chars().count() <= MAX_API_ERROR_CHARS {
        return scrubbed;
    }

    let truncated: String = scrubbed.chars().take(MAX_API_ERROR_CHARS).collect();
    format!("{truncated}...")
}

/// Build a sanitized provider error from a failed HTTP response.
pub async fn api_error(provider: &str, response: reqwest::Response) -> anyhow::Error {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read provider error body>".to_string());
    let sanitized = sanitize_api_error(&body);
    anyhow::anyhow!("{provider} API error ({status}): {sanitized}")
}

/// Resolve API key for a provider from config and environment variables.
fn resolve_provider_credential(name: &str, credential_override: Option<&str>) -> Option<String> {
    if let Some(raw_override) = credential_override {
        let trimmed_override = raw_override.trim();
        if !trimmed_override.is_empty() {
            return Some(trimmed_override.to_owned());
        }
    }

    let provider_env_candidates: &[&str] = match name {
        "openai" => &["OPENAI_API_KEY"],
        "openrouter" => &["OPENROUTER_API_KEY"],
        "portkey" => &["PORTKEY_API_KEY", "PORTKEY_TOKEN"],
        _ => &[],
    };

    provider_env_candidates
        .iter()
        .chain(["SUPPORTDESK_API_KEY", "API_KEY"].iter())
        .find_map(|env_var| {
            std::env::var(env_var)
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        })
}

/// Factory: create the provider named in config.
///
/// `api_url` overrides the backend's default base URL. `custom:<url>` selects
/// an arbitrary OpenAI-compatible endpoint.
pub fn create_provider(
    name: &str,
    api_key: Option<&str>,
    api_url: Option<&str>,
    timeout: Duration,
) -> anyhow::Result<Box<dyn Provider>> {
    let name = name.trim();
    let key = resolve_provider_credential(name, api_key);
    let key = key.as_deref();

    let (base_url, auth) = match name {
        "openai" => ("https://api.openai.com/v1", AuthStyle::Bearer),
        "openrouter" => ("https://openrouter.ai/api/v1", AuthStyle::Bearer),
        "portkey" => (
            "https://api.portkey.ai/v1",
            AuthStyle::Custom("x-portkey-api-key".into()),
        ),
        other => match other.strip_prefix("custom:") {
            Some(url) if !url.trim().is_empty() => (url.trim(), AuthStyle::Bearer),
            _ => anyhow::bail!(
                "Unknown provider: {other}. Supported: openai, openrouter, portkey, custom:<URL>."
            ),
        },
    };

    let base_url = api_url
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .unwrap_or(base_url);

    Ok(Box::new(OpenAiCompatibleProvider::new(
        name, base_url, key, auth, timeout,
    )))
}

/// Information about a supported provider for display purposes.
pub struct ProviderInfo {
    /// Canonical name used in config (e.g. `"openai"`)
    pub name: &'static str,
    /// Human-readable display name
    pub display_name: &'static str,
}

/// Return the list of all known providers for `supportdesk status`.
pub fn list_providers() -> Vec<ProviderInfo> {
    vec![
        ProviderInfo {
            name: "openai",
            display_name: "OpenAI",
        },
        ProviderInfo {
            name: "openrouter",
            display_name: "OpenRouter",
        },
        ProviderInfo {
            name: "portkey",
            display_name: "Portkey AI Gateway",
        },
    ]
}
