// SPDX-FileCopyrightText: 2026 Handoff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Handoff coordination service.

use thiserror::Error;

/// The primary error type used across all Handoff adapter traits and core operations.
///
/// Rate limiting is not represented here: a throttled inbound message is a
/// rejected-action outcome, not a failure.
#[derive(Debug, Error)]
pub enum HandoffError {
    /// The conversation store could not complete a call.
    #[error("storage unavailable: {source}")]
    StorageUnavailable {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A single socket or outbound channel send failed.
    #[error("delivery failed: {message}")]
    DeliveryFailed {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The operation targeted a conversation that does not exist.
    #[error("conversation not found: {user_id} on {channel}")]
    NotFound { user_id: String, channel: String },

    /// The caller's credentials were rejected by the auth collaborator.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Configuration errors (invalid values, missing adapters).
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl HandoffError {
    /// Wrap any error as a storage failure.
    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        HandoffError::StorageUnavailable {
            source: Box::new(err),
        }
    }

    /// Whether this error came from the persistence layer.
    pub fn is_storage(&self) -> bool {
        matches!(self, HandoffError::StorageUnavailable { .. })
    }
}
