// SPDX-FileCopyrightText: 2026 Handoff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the visitor endpoints and the dashboard REST API.

use axum::{
    extract::{Form, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use handoff_coordinator::{HistoryEntry, InboundOutcome};
use handoff_core::events::ConversationSnapshot;
use handoff_core::{
    Followup, HandoffError, HealthStatus, Message, PluginAdapter, StaffIdentity, StaffRole,
};
use handoff_twilio::{twiml_empty, twiml_message, InboundForm};

use crate::server::GatewayState;

/// Channel name used for browser visitors.
pub const WEBCHAT: &str = "webchat";

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// A core error rendered as an HTTP response.
///
/// Storage failures surface as a generic 503; their detail stays in the logs.
#[derive(Debug)]
pub struct ApiError(pub HandoffError);

impl From<HandoffError> for ApiError {
    fn from(e: HandoffError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match &self.0 {
            HandoffError::NotFound { .. } => (StatusCode::NOT_FOUND, self.0.to_string()),
            HandoffError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, self.0.to_string()),
            HandoffError::StorageUnavailable { .. } => {
                tracing::error!(error = %self.0, "request failed on storage");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "storage temporarily unavailable".to_string(),
                )
            }
            _ => {
                tracing::error!(error = %self.0, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub admins_connected: usize,
}

/// GET /health
///
/// Unauthenticated. Reports `degraded` when the store health check does not
/// come back healthy.
pub async fn get_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    let status = match state.coordinator.store().health_check().await {
        Ok(HealthStatus::Healthy) => "ok",
        Ok(_) | Err(_) => "degraded",
    };
    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        admins_connected: state.coordinator.hub().admin_count(),
    })
}

/// Request body for POST /webchat.
#[derive(Debug, Deserialize)]
pub struct WebchatRequest {
    pub user_id: String,
    #[serde(default)]
    pub channel: Option<String>,
    pub text: String,
}

/// Response body for POST /webchat.
#[derive(Debug, Serialize)]
pub struct InboundResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub followup_id: Option<i64>,
}

impl InboundResponse {
    fn from_outcome(outcome: InboundOutcome) -> (StatusCode, Self) {
        match outcome {
            InboundOutcome::Accepted {
                followup_id, reply, ..
            } => (
                StatusCode::OK,
                Self {
                    status: "accepted",
                    reply,
                    followup_id,
                },
            ),
            InboundOutcome::RateLimited { notice } => (
                StatusCode::TOO_MANY_REQUESTS,
                Self {
                    status: "rate_limited",
                    reply: Some(notice),
                    followup_id: None,
                },
            ),
        }
    }
}

/// POST /webchat
pub async fn post_webchat(
    State(state): State<GatewayState>,
    Json(body): Json<WebchatRequest>,
) -> Result<Response, ApiError> {
    if body.user_id.trim().is_empty() || body.text.trim().is_empty() {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "user_id and text are required".to_string(),
            }),
        )
            .into_response());
    }
    let channel = body.channel.as_deref().unwrap_or(WEBCHAT);
    let outcome = state
        .coordinator
        .handle_inbound(channel, &body.user_id, &body.text)
        .await?;
    let (status, response) = InboundResponse::from_outcome(outcome);
    Ok((status, Json(response)).into_response())
}

/// Request body for POST /webchat/followup: an offline contact form.
#[derive(Debug, Deserialize)]
pub struct FollowupRequest {
    pub user_id: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct FollowupCreated {
    pub id: i64,
}

/// POST /webchat/followup
pub async fn post_webchat_followup(
    State(state): State<GatewayState>,
    Json(body): Json<FollowupRequest>,
) -> Result<(StatusCode, Json<FollowupCreated>), ApiError> {
    let channel = body.channel.as_deref().unwrap_or(WEBCHAT);
    let id = state
        .coordinator
        .handle_followup(&body.user_id, channel, body.contact, &body.message)
        .await?;
    Ok((StatusCode::CREATED, Json(FollowupCreated { id })))
}

/// POST /sms
///
/// Twilio inbound webhook. Always answers with TwiML so the provider never
/// retries; failures are logged and answered with an empty response.
pub async fn post_sms(State(state): State<GatewayState>, Form(form): Form<InboundForm>) -> Response {
    let (kind, sender) = form.sender();
    let channel = kind.to_string();
    let (status, body) = match state
        .coordinator
        .handle_inbound(&channel, &sender, &form.body)
        .await
    {
        Ok(outcome) => match outcome.reply() {
            Some(reply) => (StatusCode::OK, twiml_message(reply)),
            None => (StatusCode::OK, twiml_empty()),
        },
        Err(e) => {
            tracing::error!(%channel, error = %e, "inbound webhook failed");
            (StatusCode::INTERNAL_SERVER_ERROR, twiml_empty())
        }
    };
    (status, [(header::CONTENT_TYPE, "application/xml")], body).into_response()
}

/// Identifies one conversation in admin request bodies.
#[derive(Debug, Deserialize)]
pub struct ConversationRef {
    pub user_id: String,
    pub channel: String,
}

#[derive(Debug, Deserialize)]
pub struct ReplyRequest {
    pub user_id: String,
    pub channel: String,
    pub text: String,
}

/// POST /admin/api/reply
pub async fn post_reply(
    State(state): State<GatewayState>,
    Extension(identity): Extension<StaffIdentity>,
    Json(body): Json<ReplyRequest>,
) -> Result<Json<Message>, ApiError> {
    let message = state
        .coordinator
        .handle_staff_reply(&body.user_id, &body.channel, &body.text, Some(&identity))
        .await?;
    Ok(Json(message))
}

#[derive(Debug, Serialize)]
pub struct CloseResponse {
    /// `false` when the conversation was already closed.
    pub closed: bool,
}

/// POST /admin/api/close
pub async fn post_close(
    State(state): State<GatewayState>,
    Json(body): Json<ConversationRef>,
) -> Result<Json<CloseResponse>, ApiError> {
    let closed = state
        .coordinator
        .handle_close(&body.user_id, &body.channel)
        .await?;
    Ok(Json(CloseResponse { closed }))
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub user_id: String,
    pub channel: String,
    /// Assignee name. Only admins may assign someone other than themselves.
    #[serde(default)]
    pub staff: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AssignResponse {
    pub assigned: bool,
    pub staff: String,
}

/// POST /admin/api/assign
pub async fn post_assign(
    State(state): State<GatewayState>,
    Extension(identity): Extension<StaffIdentity>,
    Json(body): Json<AssignRequest>,
) -> Result<Response, ApiError> {
    let assignee = match body.staff {
        Some(name) if name != identity.name => {
            if identity.role != StaffRole::Admin {
                return Ok((
                    StatusCode::FORBIDDEN,
                    Json(ErrorResponse {
                        error: "only admins can assign other staff".to_string(),
                    }),
                )
                    .into_response());
            }
            StaffIdentity {
                name,
                role: StaffRole::Staff,
            }
        }
        _ => identity,
    };
    let assigned = state
        .coordinator
        .handle_assign(&body.user_id, &body.channel, &assignee)
        .await?;
    Ok(Json(AssignResponse {
        assigned,
        staff: assignee.name,
    })
    .into_response())
}

/// GET /admin/api/conversations
pub async fn get_conversations(
    State(state): State<GatewayState>,
) -> Result<Json<Vec<ConversationSnapshot>>, ApiError> {
    Ok(Json(state.coordinator.snapshot().await?))
}

/// GET /admin/api/conversations/{channel}/{user_id}
pub async fn get_transcript(
    State(state): State<GatewayState>,
    Path((channel, user_id)): Path<(String, String)>,
) -> Result<Json<Vec<Message>>, ApiError> {
    Ok(Json(state.coordinator.transcript(&user_id, &channel).await?))
}

#[derive(Debug, Deserialize)]
pub struct FollowupQuery {
    #[serde(default)]
    pub unresolved: bool,
}

/// GET /admin/api/followups
pub async fn get_followups(
    State(state): State<GatewayState>,
    Query(query): Query<FollowupQuery>,
) -> Result<Json<Vec<Followup>>, ApiError> {
    Ok(Json(state.coordinator.followups(query.unresolved).await?))
}

/// POST /admin/api/followups/{id}/view
pub async fn post_view_followup(
    State(state): State<GatewayState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if state.coordinator.mark_followup_viewed(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Ok(StatusCode::NOT_FOUND)
    }
}

#[derive(Debug, Serialize)]
pub struct UnviewedCount {
    pub count: u64,
}

/// GET /admin/api/followups/unviewed-count
pub async fn get_unviewed_count(
    State(state): State<GatewayState>,
) -> Result<Json<UnviewedCount>, ApiError> {
    let count = state.coordinator.unviewed_followups().await?;
    Ok(Json(UnviewedCount { count }))
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub history: Vec<HistoryEntry>,
}

/// GET /admin/api/history
///
/// Admins only.
pub async fn get_history(
    State(state): State<GatewayState>,
    Extension(identity): Extension<StaffIdentity>,
) -> Result<Response, ApiError> {
    if identity.role != StaffRole::Admin {
        return Ok((
            StatusCode::FORBIDDEN,
            Json(ErrorResponse {
                error: "history is restricted to admins".to_string(),
            }),
        )
            .into_response());
    }
    let history = state.coordinator.history().await?;
    Ok(Json(HistoryResponse { history }).into_response())
}

/// POST /admin/api/followups/{id}/resolve
pub async fn post_resolve_followup(
    State(state): State<GatewayState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if state.coordinator.resolve_followup(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Ok(StatusCode::NOT_FOUND)
    }
}
