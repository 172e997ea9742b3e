// SPDX-FileCopyrightText: 2026 Handoff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound channel adapter trait (SMS, WhatsApp, messenger-style webhooks).

use async_trait::async_trait;

use crate::error::HandoffError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ChannelKind, MessageId};

/// Delivers text to an identity on one outward channel kind.
///
/// There is one adapter per outward kind. Webchat has no adapter: sending to
/// a webchat visitor is a fan-out push.
#[async_trait]
pub trait ChannelAdapter: PluginAdapter {
    /// The channel kind this adapter delivers to.
    fn kind(&self) -> ChannelKind;

    /// Sends `text` to `destination` (a phone number, WhatsApp id, or page-scoped id).
    async fn send_text(&self, destination: &str, text: &str) -> Result<MessageId, HandoffError>;
}
