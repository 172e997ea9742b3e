// SPDX-FileCopyrightText: 2026 Handoff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket endpoints for visitors and the staff dashboard.
//!
//! Client -> Server (JSON), visitor socket:
//! ```json
//! {"type": "message", "text": "Is anyone there?"}
//! {"type": "typing"}
//! {"type": "stop_typing"}
//! ```
//!
//! Client -> Server (JSON), dashboard socket:
//! ```json
//! {"type": "reply", "user_id": "alice", "channel": "webchat", "text": "Hi!"}
//! {"type": "typing", "user_id": "alice", "channel": "webchat"}
//! ```
//!
//! Server -> Client frames are serialized [`HubEvent`]s.

use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use handoff_core::{HubEvent, SenderRole, StaffIdentity};

use crate::handlers::WEBCHAT;
use crate::server::GatewayState;

/// Frame sent by a visitor's browser.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
enum VisitorFrame {
    Message { text: String },
    Typing,
    StopTyping,
}

/// Frame sent by a dashboard socket.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
enum DashboardFrame {
    Reply {
        user_id: String,
        channel: String,
        text: String,
    },
    Typing {
        user_id: String,
        channel: String,
    },
    StopTyping {
        user_id: String,
        channel: String,
    },
}

#[derive(Debug, Deserialize)]
pub struct AdminWsQuery {
    #[serde(default)]
    token: String,
}

/// GET /ws/{user_id}
pub async fn user_ws_handler(
    ws: WebSocketUpgrade,
    Path(user_id): Path<String>,
    State(state): State<GatewayState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_visitor_socket(socket, user_id, state))
}

/// GET /admin-ws?token=
///
/// The token is checked before the upgrade; a rejected handshake never
/// becomes a socket.
pub async fn admin_ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<AdminWsQuery>,
    State(state): State<GatewayState>,
) -> Response {
    match state.auth.authenticate(&query.token).await {
        Ok(identity) => ws.on_upgrade(move |socket| handle_dashboard_socket(socket, identity, state)),
        Err(e) => {
            tracing::debug!(error = %e, "dashboard socket rejected");
            StatusCode::UNAUTHORIZED.into_response()
        }
    }
}

/// Drain hub frames into the socket, pinging while idle.
///
/// Ends when the hub drops the queue (socket pruned) or a send fails; either
/// way `done` is cancelled so the read loop tears the connection down.
fn spawn_writer(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<String>,
    keepalive: Duration,
    done: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let ping = HubEvent::Ping.to_json();
        loop {
            let frame = match tokio::time::timeout(keepalive, rx.recv()).await {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(_) => ping.clone(),
            };
            if sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
        done.cancel();
    })
}

/// Next text frame from the client, or `None` once the connection is over.
async fn next_text(stream: &mut SplitStream<WebSocket>, done: &CancellationToken) -> Option<String> {
    loop {
        let msg = tokio::select! {
            _ = done.cancelled() => return None,
            msg = stream.next() => msg,
        };
        match msg {
            Some(Ok(Message::Text(text))) => {
                let text_str: &str = &text;
                return Some(text_str.to_string());
            }
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return None,
            // Binary and protocol ping/pong frames carry nothing for us.
            Some(Ok(_)) => {}
        }
    }
}

async fn handle_visitor_socket(socket: WebSocket, user_id: String, state: GatewayState) {
    let (sink, mut stream) = socket.split();
    let (tx, rx) = mpsc::channel::<String>(state.sockets.buffer);
    let coordinator = state.coordinator.clone();
    let id = coordinator.register_user_socket(&user_id, WEBCHAT, tx);
    let done = CancellationToken::new();
    let writer = spawn_writer(sink, rx, state.sockets.keepalive, done.clone());

    while let Some(text) = next_text(&mut stream, &done).await {
        let frame: VisitorFrame = match serde_json::from_str(&text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(%user_id, "invalid visitor frame: {e}");
                continue;
            }
        };
        match frame {
            VisitorFrame::Message { text } => {
                if let Err(e) = coordinator.handle_inbound(WEBCHAT, &user_id, &text).await {
                    tracing::error!(%user_id, error = %e, "failed to record visitor message");
                }
            }
            VisitorFrame::Typing => {
                coordinator.relay_typing(&user_id, WEBCHAT, SenderRole::User, true);
            }
            VisitorFrame::StopTyping => {
                coordinator.relay_typing(&user_id, WEBCHAT, SenderRole::User, false);
            }
        }
    }

    coordinator.unregister_user_socket(&user_id, WEBCHAT, id);
    writer.abort();
}

async fn handle_dashboard_socket(socket: WebSocket, identity: StaffIdentity, state: GatewayState) {
    let (sink, mut stream) = socket.split();
    let (tx, rx) = mpsc::channel::<String>(state.sockets.buffer);
    let done = CancellationToken::new();
    let writer = spawn_writer(sink, rx, state.sockets.keepalive, done.clone());
    let coordinator = state.coordinator.clone();

    let id = match coordinator.register_admin_socket(identity.clone(), tx).await {
        Ok(id) => id,
        Err(e) => {
            tracing::error!(staff = %identity.name, error = %e, "snapshot replay failed, closing dashboard socket");
            writer.abort();
            return;
        }
    };
    tracing::info!(staff = %identity.name, socket = %id, "dashboard connected");

    while let Some(text) = next_text(&mut stream, &done).await {
        let frame: DashboardFrame = match serde_json::from_str(&text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(staff = %identity.name, "invalid dashboard frame: {e}");
                continue;
            }
        };
        match frame {
            DashboardFrame::Reply {
                user_id,
                channel,
                text,
            } => {
                if let Err(e) = coordinator
                    .handle_staff_reply(&user_id, &channel, &text, Some(&identity))
                    .await
                {
                    tracing::warn!(%user_id, %channel, error = %e, "dashboard reply failed");
                }
            }
            DashboardFrame::Typing { user_id, channel } => {
                coordinator.relay_typing(&user_id, &channel, SenderRole::Staff, true);
            }
            DashboardFrame::StopTyping { user_id, channel } => {
                coordinator.relay_typing(&user_id, &channel, SenderRole::Staff, false);
            }
        }
    }

    coordinator.unregister_admin_socket(id);
    writer.abort();
    tracing::info!(staff = %identity.name, socket = %id, "dashboard disconnected");
}
