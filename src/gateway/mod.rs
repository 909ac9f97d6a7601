//! HTTP gateway exposing the escalation controller.

pub mod api;

use crate::config::Config;
use crate::escalation::{self, EscalationController};
use crate::sessions;
use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Slack between the handler deadline and the router-level backstop timeout.
const TIMEOUT_BACKSTOP_GRACE: Duration = Duration::from_secs(5);

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<EscalationController>,
    pub api_tokens: Arc<[String]>,
    /// Deadline for one `/api/agents/respond` call, lock wait included.
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(
        controller: Arc<EscalationController>,
        api_tokens: &[String],
        request_timeout: Duration,
    ) -> Self {
        Self {
            controller,
            request_timeout,
            api_tokens: api_tokens
                .iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }
}

/// Limits applied to every route.
#[derive(Debug, Clone, Copy)]
pub struct RouterLimits {
    pub request_timeout: Duration,
    pub max_body_bytes: usize,
}

impl RouterLimits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            request_timeout: Duration::from_secs(config.gateway.request_timeout_secs),
            max_body_bytes: config.gateway.max_body_bytes,
        }
    }
}

pub fn build_router(state: AppState, limits: RouterLimits) -> Router {
    Router::new()
        .route("/health", get(api::handle_health))
        .route("/api/agents/respond", post(api::handle_respond))
        .route("/api/agents/respond/", post(api::handle_respond))
        .route(
            "/api/agents/sessions/{id}",
            get(api::handle_session_get).delete(api::handle_session_delete),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(limits.max_body_bytes))
                .layer(TimeoutLayer::new(
                    limits.request_timeout + TIMEOUT_BACKSTOP_GRACE,
                )),
        )
        .with_state(state)
}

/// Run the gateway until Ctrl-C.
pub async fn run_gateway(host: &str, port: u16, config: Config) -> Result<()> {
    let controller = escalation::create_controller(&config, sessions::create_session_store())?;
    let limits = RouterLimits::from_config(&config);
    let state = AppState::new(
        Arc::new(controller),
        &config.gateway.api_tokens,
        limits.request_timeout,
    );
    if state.api_tokens.is_empty() {
        tracing::warn!("gateway.api_tokens is empty; /api routes accept unauthenticated requests");
    }

    let app = build_router(state, limits);

    let listener = tokio::net::TcpListener::bind((host, port))
        .await
        .with_context(|| format!("Failed to bind gateway to {host}:{port}"))?;
    let local_addr = listener.local_addr()?;
    tracing::info!(%local_addr, "Gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await
        .context("Gateway server error")
}
