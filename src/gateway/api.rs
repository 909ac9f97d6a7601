//! REST handlers for the escalation endpoints.
//!
//! `/api/*` routes require a bearer token when `gateway.api_tokens` is set.

use super::AppState;
use crate::escalation::EscalationError;
use crate::sessions::{Session, SessionState};
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};

// ── Bearer token auth ───────────────────────────────────────────

/// Extract the bearer token from the Authorization header.
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(str::trim)
}

/// Check the bearer token against configured tokens. Returns error response if unauthorized.
fn require_auth(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    if state.api_tokens.is_empty() {
        return Ok(());
    }

    let token = extract_bearer_token(headers).unwrap_or("");
    if !token.is_empty() && state.api_tokens.iter().any(|t| t == token) {
        Ok(())
    } else {
        Err((
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "error": "Unauthorized: send Authorization: Bearer <token>",
                "kind": "unauthorized",
            })),
        )
            .into_response())
    }
}

// ── Error mapping ───────────────────────────────────────────────

pub(crate) fn status_for(err: &EscalationError) -> StatusCode {
    match err {
        EscalationError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        EscalationError::GenerationFailure(_) | EscalationError::MalformedAgentOutput(_) => {
            StatusCode::BAD_GATEWAY
        }
        EscalationError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: &EscalationError) -> Response {
    (
        status_for(err),
        Json(serde_json::json!({
            "error": err.to_string(),
            "kind": err.kind(),
        })),
    )
        .into_response()
}

// ── Bodies ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RespondBody {
    pub session_id: Option<String>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Serialize)]
struct SessionView<'a> {
    #[serde(flatten)]
    session: &'a Session,
    state: SessionState,
}

// ── Handlers ────────────────────────────────────────────────────

/// POST /api/agents/respond: feed one user message into the escalation protocol.
///
/// The whole call, waiting for the session lock included, is bounded by
/// `request_timeout`; on expiry the caller gets a `generation_failure` body.
pub async fn handle_respond(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RespondBody>,
) -> Response {
    if let Err(e) = require_auth(&state, &headers) {
        return e;
    }

    let outcome = tokio::time::timeout(
        state.request_timeout,
        state
            .controller
            .handle_message(body.session_id.as_deref(), &body.description),
    )
    .await
    .unwrap_or_else(|_| {
        tracing::warn!(
            session_id = body.session_id.as_deref().unwrap_or("(new)"),
            timeout = ?state.request_timeout,
            "respond call exceeded request timeout"
        );
        Err(EscalationError::GenerationFailure(format!(
            "request timed out after {:?}",
            state.request_timeout
        )))
    });

    match outcome {
        Ok(envelope) => Json(envelope).into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET /api/agents/sessions/{id}: session snapshot
pub async fn handle_session_get(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Response {
    if let Err(e) = require_auth(&state, &headers) {
        return e;
    }

    match state.controller.session(&session_id).await {
        Ok(session) => Json(SessionView {
            state: session.state(),
            session: &session,
        })
        .into_response(),
        Err(e) => error_response(&e),
    }
}

/// DELETE /api/agents/sessions/{id}: drop a session
pub async fn handle_session_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Response {
    if let Err(e) = require_auth(&state, &headers) {
        return e;
    }

    match state.controller.delete_session(&session_id).await {
        Ok(()) => Json(serde_json::json!({"status": "ok", "deleted": session_id})).into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET /health: liveness probe, no auth
pub async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "session_store": state.controller.store().name(),
        "max_attempts": state.controller.max_attempts(),
    }))
}
