// SPDX-FileCopyrightText: 2026 Kindera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router,
    routing::{get, post},
};
use kindera_config::model::GatewayConfig;
use kindera_core::KinderaError;
use kindera_selector::SelectionCache;
use kindera_session::SessionManager;
use kindera_usage::UsageMonitor;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use crate::handlers;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    /// Conversation registry and turn dispatcher.
    pub manager: Arc<SessionManager>,
    /// Token usage counters for the usage endpoint.
    pub monitor: Arc<UsageMonitor>,
    /// Selection cache counters for the usage endpoint.
    pub cache: Arc<SelectionCache>,
    /// Process start time for uptime calculation.
    pub start_time: Instant,
}

impl GatewayState {
    pub fn new(
        manager: Arc<SessionManager>,
        monitor: Arc<UsageMonitor>,
        cache: Arc<SelectionCache>,
    ) -> Self {
        Self {
            manager,
            monitor,
            cache,
            start_time: Instant::now(),
        }
    }
}

/// Build the gateway router.
///
/// Routes:
/// - POST /v1/assistant/messages (SSE push-event stream)
/// - POST /v1/assistant/conversations/{id}/cancel
/// - GET /v1/assistant/usage
/// - GET /health
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/health", get(handlers::get_health))
        .route(
            "/v1/assistant/messages",
            post(handlers::post_assistant_messages),
        )
        .route(
            "/v1/assistant/conversations/{id}/cancel",
            post(handlers::post_cancel_conversation),
        )
        .route("/v1/assistant/usage", get(handlers::get_usage))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the gateway HTTP server.
///
/// Serves until `shutdown` is cancelled, then stops accepting new
/// connections. Draining in-flight turns is the session manager's job.
pub async fn start_server(
    config: &GatewayConfig,
    state: GatewayState,
    shutdown: CancellationToken,
) -> Result<(), KinderaError> {
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| KinderaError::Internal(format!("failed to bind gateway to {addr}: {e}")))?;

    tracing::info!("gateway listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| KinderaError::Internal(format!("gateway server error: {e}")))?;

    Ok(())
}
