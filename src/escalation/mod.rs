//! Escalation protocol. Decides per conversation whether to keep attempting
//! automated resolution or hand off to a drafted ticket.
//!
//! A session counts attempts per *solution cycle*, not per message: a
//! clarifying question keeps the current attempt open, an offered solution
//! closes it. Once a message would start attempt `max_attempts + 1`, the
//! drafting agent turns the transcript into a ticket and the session stops
//! asking the resolution agent.

pub mod controller;
pub mod envelope;
pub mod error;
#[cfg(test)]
pub(crate) mod testing;

pub use controller::EscalationController;
pub use envelope::{Envelope, EnvelopeBody};
pub use error::EscalationError;

use std::sync::Arc;

use crate::agent::ModelSettings;
use crate::config::Config;
use crate::providers;
use crate::sessions::SessionStore;

/// Build a controller from config: provider, model settings and attempt budget.
pub fn create_controller(
    config: &Config,
    store: Arc<dyn SessionStore>,
) -> anyhow::Result<EscalationController> {
    let provider = providers::create_provider(
        config
            .default_provider
            .as_deref()
            .unwrap_or(crate::config::DEFAULT_PROVIDER),
        config.api_key.as_deref(),
        config.api_url.as_deref(),
        std::time::Duration::from_secs(config.provider_timeout_secs),
    )?;

    let settings = ModelSettings {
        model: config
            .default_model
            .clone()
            .unwrap_or_else(|| crate::config::DEFAULT_MODEL.to_string()),
        temperature: config.default_temperature,
    };

    tracing::info!(
        provider = provider.name(),
        model = %settings.model,
        max_attempts = config.escalation.max_attempts,
        store = store.name(),
        "escalation controller ready"
    );

    Ok(EscalationController::new(
        store,
        Arc::from(provider),
        settings,
        config.escalation.max_attempts,
    ))
}
