// SPDX-FileCopyrightText: 2026 Handoff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lifecycle of a single (user, channel) conversation.
//!
//! Every write goes through a guarded [`ConversationUpdate`] so that the
//! router and the escalation scheduler can act on the same conversation
//! without losing each other's changes. Store errors propagate unchanged;
//! nothing here retries.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use handoff_core::{
    Conversation, ConversationKey, ConversationStore, ConversationUpdate, EscalationStage,
    HandoffError, HubEvent, Message, NewFollowup, SenderRole, StaffIdentity, StageTransition,
};

use crate::hub::FanoutHub;

/// Result of recording an inbound visitor message.
#[derive(Debug, Clone)]
pub struct InboundRecord {
    /// The conversation after the message was recorded.
    pub conversation: Conversation,
    /// This was the first message ever for the (user, channel) pair.
    pub first_message: bool,
    /// A closed conversation was reopened by this message.
    pub reopened: bool,
}

impl InboundRecord {
    /// The visitor is answering the final notice; their text is a callback request.
    pub fn awaiting_followup(&self) -> bool {
        !self.reopened
            && self.conversation.open
            && self.conversation.assigned_staff.is_none()
            && self.conversation.escalation_stage == EscalationStage::FinalSent
    }
}

/// Applies inbound, staff, close, assign, follow-up, and escalation events.
pub struct ConversationStateMachine {
    store: Arc<dyn ConversationStore>,
    hub: Arc<FanoutHub>,
}

impl ConversationStateMachine {
    pub fn new(store: Arc<dyn ConversationStore>, hub: Arc<FanoutHub>) -> Self {
        Self { store, hub }
    }

    async fn require(&self, key: &ConversationKey) -> Result<Conversation, HandoffError> {
        self.store
            .get_conversation(key)
            .await?
            .ok_or_else(|| HandoffError::NotFound {
                user_id: key.user_id.clone(),
                channel: key.channel.clone(),
            })
    }

    /// Persist a system message and announce it on both fan-out domains.
    async fn system_notice(
        &self,
        key: &ConversationKey,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<(), HandoffError> {
        let notice = Message::new(key, SenderRole::System, text, now);
        self.store.append_message(&notice).await?;
        self.hub.publish(key, &HubEvent::from_message(&notice));
        Ok(())
    }

    /// Record visitor text, creating or reopening the conversation as needed.
    ///
    /// Reopening resets the escalation stage to `None`. `assigned_staff` is
    /// never touched here.
    pub async fn record_inbound(
        &self,
        key: &ConversationKey,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<InboundRecord, HandoffError> {
        let (mut conversation, created) =
            self.store.create_or_get_conversation(key, now).await?;

        let mut reopened = false;
        if !created {
            let reopen = ConversationUpdate::new()
                .expect_open(false)
                .open(true)
                .stage(EscalationStage::None)
                .escalated_at(None)
                .closed_at(None)
                .handled_by(None)
                .touched(now);
            let touch = ConversationUpdate::new().touched(now);

            if !conversation.open && self.store.update_conversation(key, &reopen).await? {
                conversation.apply(&reopen);
                reopened = true;
                info!(%key, "conversation reopened");
            } else {
                // Open already, or a concurrent message won the reopen.
                self.store.update_conversation(key, &touch).await?;
                if !conversation.open {
                    conversation.apply(&reopen);
                } else {
                    conversation.apply(&touch);
                }
            }
        } else {
            info!(%key, "conversation created");
        }

        let message = Message::new(key, SenderRole::User, text, now);
        self.store.append_message(&message).await?;
        self.hub.publish(key, &HubEvent::from_message(&message));

        Ok(InboundRecord {
            conversation,
            first_message: created,
            reopened,
        })
    }

    /// Record a staff reply and stop auto-escalation for this open period.
    pub async fn record_staff_reply(
        &self,
        key: &ConversationKey,
        text: &str,
        staff: Option<&StaffIdentity>,
        now: DateTime<Utc>,
    ) -> Result<Message, HandoffError> {
        self.require(key).await?;

        let message = Message::new(key, SenderRole::Staff, text, now);
        self.store.append_message(&message).await?;

        let engage = ConversationUpdate::new()
            .stage(EscalationStage::Terminated)
            .touched(now);
        self.store.update_conversation(key, &engage).await?;
        debug!(%key, "escalation terminated by staff reply");

        self.hub.publish(
            key,
            &HubEvent::StaffMessage {
                text: message.text.clone(),
                ts: now,
                staff: staff.map(|s| s.name.clone()),
            },
        );
        Ok(message)
    }

    /// Close the conversation and release its assignment.
    ///
    /// Returns `false` when it was already closed.
    pub async fn close(&self, key: &ConversationKey, now: DateTime<Utc>) -> Result<bool, HandoffError> {
        let conversation = self.require(key).await?;

        let close = ConversationUpdate::closing(conversation.assigned_staff, now);
        if !self.store.update_conversation(key, &close).await? {
            debug!(%key, "close on a closed conversation ignored");
            return Ok(false);
        }
        info!(%key, "conversation closed");
        self.system_notice(key, "Conversation closed.", now).await?;
        Ok(true)
    }

    /// Assign an open conversation to a staff member.
    ///
    /// Returns `false` when the conversation is closed.
    pub async fn assign(
        &self,
        key: &ConversationKey,
        staff: &StaffIdentity,
        now: DateTime<Utc>,
    ) -> Result<bool, HandoffError> {
        self.require(key).await?;

        let assign = ConversationUpdate::new()
            .expect_open(true)
            .assigned_staff(Some(staff.name.clone()))
            .touched(now);
        if !self.store.update_conversation(key, &assign).await? {
            return Ok(false);
        }
        info!(%key, staff = %staff.name, "conversation assigned");
        self.system_notice(key, &format!("{} joined the conversation.", staff.name), now)
            .await?;
        Ok(true)
    }

    /// Store an offline callback request, acknowledge it, and close the thread.
    pub async fn capture_followup(
        &self,
        key: &ConversationKey,
        contact: Option<String>,
        message: &str,
        acknowledgement: &str,
        now: DateTime<Utc>,
    ) -> Result<i64, HandoffError> {
        let id = self
            .store
            .create_followup(&NewFollowup {
                user_id: key.user_id.clone(),
                channel: key.channel.clone(),
                contact,
                message: message.to_string(),
                created_at: now,
            })
            .await?;
        info!(%key, followup_id = id, "follow-up captured");

        self.system_notice(key, acknowledgement, now).await?;

        let assigned = self
            .store
            .get_conversation(key)
            .await?
            .and_then(|c| c.assigned_staff);
        let close = ConversationUpdate::closing(assigned, now);
        if !self.store.update_conversation(key, &close).await? {
            debug!(%key, followup_id = id, "follow-up left on an already closed conversation");
        }
        Ok(id)
    }

    /// Advance an idle conversation one escalation stage and announce the notice.
    ///
    /// `conversation` is the record the idle time was measured on. Returns
    /// `false` when a concurrent writer changed the stage, assigned or closed
    /// the conversation, or recorded activity since that read.
    pub async fn escalate(
        &self,
        conversation: &Conversation,
        to: EscalationStage,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, HandoffError> {
        let key = conversation.key();
        let notice = Message::new(&key, SenderRole::System, text, now);
        let transition = StageTransition::from_observed(conversation, to, notice);
        if !self.store.advance_stage(&key, &transition).await? {
            debug!(%key, from = %transition.from, %to, "stage advance lost the race");
            return Ok(false);
        }
        info!(%key, from = %transition.from, %to, "escalation stage advanced");
        self.hub
            .publish(&key, &HubEvent::from_message(&transition.notice));
        Ok(true)
    }
}
