// SPDX-FileCopyrightText: 2026 Kindera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the gateway REST API.
//!
//! Handles POST /v1/assistant/messages (SSE), conversation cancel,
//! GET /health, and GET /v1/assistant/usage.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use kindera_core::{AssistantRequest, KinderaError};
use kindera_selector::cache::CacheStats;
use kindera_usage::monitor::MonitorStats;
use serde::Serialize;

use crate::server::GatewayState;
use crate::sse;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Stable error kind from the error taxonomy.
    pub kind: String,
    /// Error description.
    pub error: String,
}

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// Response body for POST .../cancel.
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    /// Whether a turn was in flight and got cancelled.
    pub cancelled: bool,
}

/// Response body for GET /v1/assistant/usage.
#[derive(Debug, Serialize)]
pub struct UsageResponse {
    pub usage: MonitorStats,
    pub selection_cache: CacheStats,
    pub conversations: usize,
    pub active_turns: usize,
}

/// POST /v1/assistant/messages
///
/// Accepts one user message and streams the turn's push events back as
/// SSE. Rejections (busy conversation, invalid request) come back as
/// plain JSON errors before the stream starts.
pub async fn post_assistant_messages(
    State(state): State<GatewayState>,
    Json(body): Json<AssistantRequest>,
) -> Response {
    if body.message.trim().is_empty() {
        return error_response(&KinderaError::Validation {
            message: "message must not be empty".to_string(),
        });
    }
    if body.conversation_id.trim().is_empty() {
        return error_response(&KinderaError::Validation {
            message: "conversation_id must not be empty".to_string(),
        });
    }

    match state.manager.handle(body) {
        Ok(handle) => sse::turn_stream(handle).into_response(),
        Err(err) => error_response(&err),
    }
}

/// POST /v1/assistant/conversations/{id}/cancel
///
/// Cancels the in-flight turn for a conversation. Idempotent: returns
/// `cancelled: false` when nothing is in flight.
pub async fn post_cancel_conversation(
    State(state): State<GatewayState>,
    Path(conversation_id): Path<String>,
) -> Json<CancelResponse> {
    let cancelled = state.manager.cancel(&conversation_id);
    Json(CancelResponse { cancelled })
}

/// GET /health
pub async fn get_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /v1/assistant/usage
///
/// Token usage counters, selection cache counters, and conversation
/// registry sizes.
pub async fn get_usage(State(state): State<GatewayState>) -> Json<UsageResponse> {
    Json(UsageResponse {
        usage: state.monitor.stats(),
        selection_cache: state.cache.stats(),
        conversations: state.manager.conversation_count(),
        active_turns: state.manager.active_turns(),
    })
}

/// Map a pre-stream rejection to an HTTP status.
///
/// Errors raised after the stream starts ride inside the SSE stream as
/// `error` events instead.
fn error_response(err: &KinderaError) -> Response {
    let status = match err {
        KinderaError::Busy { .. } => StatusCode::CONFLICT,
        KinderaError::Validation { .. } => StatusCode::BAD_REQUEST,
        KinderaError::BudgetExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
        KinderaError::Internal(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            kind: err.kind().to_string(),
            error: err.to_string(),
        }),
    )
        .into_response()
}
