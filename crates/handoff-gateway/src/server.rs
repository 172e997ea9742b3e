// SPDX-FileCopyrightText: 2026 Handoff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use handoff_config::model::GatewayConfig;
use handoff_coordinator::Coordinator;
use handoff_core::{AuthAdapter, HandoffError};

use crate::auth::require_staff;
use crate::handlers;
use crate::ws;

/// Per-socket settings from `[gateway]`.
#[derive(Debug, Clone, Copy)]
pub struct SocketSettings {
    /// Idle interval after which a keep-alive ping is sent.
    pub keepalive: Duration,
    /// Capacity of each socket's outbound frame queue.
    pub buffer: usize,
}

impl SocketSettings {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            keepalive: Duration::from_secs(config.keepalive_secs),
            buffer: config.socket_buffer,
        }
    }
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub coordinator: Arc<Coordinator>,
    pub auth: Arc<dyn AuthAdapter>,
    pub sockets: SocketSettings,
    /// Process start time for uptime calculation.
    pub start_time: Instant,
}

impl GatewayState {
    pub fn new(
        coordinator: Arc<Coordinator>,
        auth: Arc<dyn AuthAdapter>,
        sockets: SocketSettings,
    ) -> Self {
        Self {
            coordinator,
            auth,
            sockets,
            start_time: Instant::now(),
        }
    }
}

/// Build the full route table.
///
/// - `GET /health`, `POST /webchat`, `POST /webchat/followup`, `POST /sms`: public
/// - `GET /ws/{user_id}`: visitor socket
/// - `GET /admin-ws?token=`: dashboard socket, authenticated during the handshake
/// - `/admin/api/*`: bearer-authenticated dashboard REST
pub fn build_router(state: GatewayState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .route("/webchat", post(handlers::post_webchat))
        .route("/webchat/followup", post(handlers::post_webchat_followup))
        .route("/sms", post(handlers::post_sms))
        .with_state(state.clone());

    let admin_routes = Router::new()
        .route("/admin/api/reply", post(handlers::post_reply))
        .route("/admin/api/close", post(handlers::post_close))
        .route("/admin/api/assign", post(handlers::post_assign))
        .route("/admin/api/conversations", get(handlers::get_conversations))
        .route(
            "/admin/api/conversations/{channel}/{user_id}",
            get(handlers::get_transcript),
        )
        .route("/admin/api/followups", get(handlers::get_followups))
        .route(
            "/admin/api/followups/unviewed-count",
            get(handlers::get_unviewed_count),
        )
        .route(
            "/admin/api/followups/{id}/resolve",
            post(handlers::post_resolve_followup),
        )
        .route(
            "/admin/api/followups/{id}/view",
            post(handlers::post_view_followup),
        )
        .route("/admin/api/history", get(handlers::get_history))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_staff,
        ))
        .with_state(state.clone());

    let ws_routes = Router::new()
        .route("/ws/{user_id}", get(ws::user_ws_handler))
        .route("/admin-ws", get(ws::admin_ws_handler))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(admin_routes)
        .merge(ws_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind `host:port` and serve until `shutdown` fires.
pub async fn start_server(
    config: &GatewayConfig,
    state: GatewayState,
    shutdown: CancellationToken,
) -> Result<(), HandoffError> {
    let app = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| HandoffError::Config(format!("failed to bind gateway to {addr}: {e}")))?;

    tracing::info!("gateway listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| HandoffError::Internal(format!("gateway server error: {e}")))?;

    tracing::info!("gateway stopped");
    Ok(())
}
