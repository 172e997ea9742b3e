// SPDX-FileCopyrightText: 2026 Handoff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Entry point for visitor text from any channel.
//!
//! Sequence: rate check, record, greet on first contact, treat a reply to
//! the final notice as a follow-up request, and page staff when a new
//! conversation starts.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use handoff_config::HandoffConfig;
use handoff_core::{ChannelKind, ConversationKey, HandoffError, HubEvent};

use crate::channels::ChannelRegistry;
use crate::contact::extract_contact;
use crate::hub::FanoutHub;
use crate::rate_limit::RateLimiter;
use crate::state_machine::ConversationStateMachine;

/// Texts and recipients the router needs from configuration.
#[derive(Debug, Clone)]
pub struct RouterSettings {
    pub greeting: String,
    pub rate_limit_notice: String,
    pub followup_ack: String,
    pub staff_contacts: Vec<String>,
}

impl RouterSettings {
    pub fn from_config(config: &HandoffConfig) -> Self {
        Self {
            greeting: config.greeting.text.clone(),
            rate_limit_notice: config.rate_limit.notice.clone(),
            followup_ack: config.escalation.followup_ack_message.clone(),
            staff_contacts: config.notify.staff_contacts.clone(),
        }
    }
}

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundOutcome {
    Accepted {
        /// First message ever for this (user, channel) pair.
        first_message: bool,
        /// Set when the text was captured as an offline follow-up.
        followup_id: Option<i64>,
        /// Text to return synchronously to channels without a live socket.
        reply: Option<String>,
    },
    /// Over the rate cap. Nothing was recorded.
    RateLimited { notice: String },
}

impl InboundOutcome {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, InboundOutcome::RateLimited { .. })
    }

    /// The synchronous reply, whichever way the message went.
    pub fn reply(&self) -> Option<&str> {
        match self {
            InboundOutcome::Accepted { reply, .. } => reply.as_deref(),
            InboundOutcome::RateLimited { notice } => Some(notice),
        }
    }
}

pub struct MessageRouter {
    machine: Arc<ConversationStateMachine>,
    hub: Arc<FanoutHub>,
    limiter: Arc<RateLimiter>,
    channels: Arc<ChannelRegistry>,
    settings: RouterSettings,
}

impl MessageRouter {
    pub fn new(
        machine: Arc<ConversationStateMachine>,
        hub: Arc<FanoutHub>,
        limiter: Arc<RateLimiter>,
        channels: Arc<ChannelRegistry>,
        settings: RouterSettings,
    ) -> Self {
        Self {
            machine,
            hub,
            limiter,
            channels,
            settings,
        }
    }

    pub async fn handle_inbound(
        &self,
        channel: &str,
        user_id: &str,
        text: &str,
    ) -> Result<InboundOutcome, HandoffError> {
        self.handle_inbound_at(channel, user_id, text, Utc::now()).await
    }

    /// Route one inbound message as if it arrived at `now`.
    ///
    /// Store failures while recording propagate. Greeting, paging, and
    /// channel sends never fail the call.
    pub async fn handle_inbound_at(
        &self,
        channel: &str,
        user_id: &str,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<InboundOutcome, HandoffError> {
        let key = ConversationKey::new(user_id, channel);
        if !self.limiter.check(&key) {
            info!(%key, "inbound message rejected by rate limiter");
            return Ok(InboundOutcome::RateLimited {
                notice: self.settings.rate_limit_notice.clone(),
            });
        }

        let record = self.machine.record_inbound(&key, text, now).await?;
        let kind = key.kind();
        let outward = kind.is_some_and(ChannelKind::is_outward);
        let mut reply = None;

        if record.first_message {
            if outward {
                reply = Some(self.settings.greeting.clone());
            } else {
                let greeting = HubEvent::SystemMessage {
                    text: self.settings.greeting.clone(),
                    ts: now,
                };
                let delivery = self.hub.push(&key, &greeting);
                debug!(%key, delivered = delivery.delivered, "greeting pushed");
            }
        }

        let mut followup_id = None;
        if record.awaiting_followup() {
            let contact = extract_contact(text, kind, user_id);
            let id = self
                .machine
                .capture_followup(&key, contact, text, &self.settings.followup_ack, now)
                .await?;
            followup_id = Some(id);
            if outward {
                reply = Some(self.settings.followup_ack.clone());
            }
        } else if record.first_message || record.reopened {
            self.page_staff(&key, text);
        }

        Ok(InboundOutcome::Accepted {
            first_message: record.first_message,
            followup_id,
            reply,
        })
    }

    fn page_staff(&self, key: &ConversationKey, text: &str) {
        if self.settings.staff_contacts.is_empty() {
            return;
        }
        let alert = format!(
            "New conversation from {} on {}: {}",
            key.user_id,
            key.channel,
            preview(text)
        );
        for contact in &self.settings.staff_contacts {
            self.channels.dispatch(ChannelKind::Sms, contact, &alert);
        }
    }
}

fn preview(text: &str) -> String {
    const MAX_CHARS: usize = 120;
    if text.chars().count() <= MAX_CHARS {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(MAX_CHARS).collect();
    cut.push_str("...");
    cut
}
