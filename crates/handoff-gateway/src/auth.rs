// SPDX-FileCopyrightText: 2026 Handoff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dashboard authentication.
//!
//! Identities come from an [`AuthAdapter`]; the built-in [`StaticTokenAuth`]
//! maps the configured admin and staff tokens to roles. Admin REST routes
//! take a bearer token, the admin socket a `token` query parameter.
//!
//! When no token is configured, every credential is rejected (fail-closed).

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};

use handoff_config::model::GatewayConfig;
use handoff_core::{
    AdapterType, AuthAdapter, HandoffError, HealthStatus, PluginAdapter, StaffIdentity, StaffRole,
};

use crate::server::GatewayState;

/// Token-to-role mapping from `[gateway]` configuration.
#[derive(Clone)]
pub struct StaticTokenAuth {
    admin_token: Option<String>,
    staff_token: Option<String>,
}

impl StaticTokenAuth {
    pub fn new(admin_token: Option<String>, staff_token: Option<String>) -> Self {
        Self {
            admin_token,
            staff_token,
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(config.admin_token.clone(), config.staff_token.clone())
    }

    fn is_configured(&self) -> bool {
        self.admin_token.is_some() || self.staff_token.is_some()
    }
}

impl std::fmt::Debug for StaticTokenAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenAuth")
            .field("admin_token", &self.admin_token.as_ref().map(|_| "[redacted]"))
            .field("staff_token", &self.staff_token.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

#[async_trait]
impl PluginAdapter for StaticTokenAuth {
    fn name(&self) -> &str {
        "static-token"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Auth
    }

    async fn health_check(&self) -> Result<HealthStatus, HandoffError> {
        if self.is_configured() {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Degraded(
                "no dashboard tokens configured".to_string(),
            ))
        }
    }

    async fn shutdown(&self) -> Result<(), HandoffError> {
        Ok(())
    }
}

#[async_trait]
impl AuthAdapter for StaticTokenAuth {
    async fn authenticate(&self, token: &str) -> Result<StaffIdentity, HandoffError> {
        if token.is_empty() {
            return Err(HandoffError::Unauthorized("empty token".to_string()));
        }
        if self.admin_token.as_deref() == Some(token) {
            return Ok(StaffIdentity {
                name: "admin".to_string(),
                role: StaffRole::Admin,
            });
        }
        if self.staff_token.as_deref() == Some(token) {
            return Ok(StaffIdentity {
                name: "staff".to_string(),
                role: StaffRole::Staff,
            });
        }
        Err(HandoffError::Unauthorized("unknown token".to_string()))
    }
}

/// Resolve the bearer token and attach the [`StaffIdentity`] to the request.
pub async fn require_staff(
    State(state): State<GatewayState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    match state.auth.authenticate(token).await {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            Ok(next.run(request).await)
        }
        Err(e) => {
            tracing::debug!(error = %e, "admin request rejected");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
