// SPDX-FileCopyrightText: 2026 Handoff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Periodic escalation of unattended conversations.
//!
//! A single polling controller rather than one timer per conversation: each
//! tick scans open conversations and moves idle, unassigned ones one step
//! along `None -> PatienceSent -> FinalSent`. The stage guard in the store
//! makes a tick that races a staff reply or close lose cleanly.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error};

use handoff_config::model::{EscalationConfig, NotifyConfig};
use handoff_core::{
    ChannelKind, Conversation, ConversationKey, ConversationStore, EscalationStage, HandoffError,
};

use crate::channels::ChannelRegistry;
use crate::state_machine::ConversationStateMachine;

/// Idle thresholds for the two automatic stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscalationPolicy {
    pub patience_after: chrono::Duration,
    pub final_after: chrono::Duration,
}

impl EscalationPolicy {
    pub fn from_config(config: &EscalationConfig) -> Self {
        Self {
            patience_after: chrono::Duration::seconds(config.patience_secs as i64),
            final_after: chrono::Duration::seconds(config.final_secs as i64),
        }
    }

    /// The stage a conversation should move to at `now`, if any.
    ///
    /// Closed, assigned, and staff-engaged conversations never escalate.
    /// Idle time is measured from the last user or staff activity.
    pub fn next_stage(&self, conversation: &Conversation, now: DateTime<Utc>) -> Option<EscalationStage> {
        if !conversation.open || conversation.assigned_staff.is_some() {
            return None;
        }
        let idle = now - conversation.updated_at;
        match conversation.escalation_stage {
            EscalationStage::None if idle >= self.patience_after => {
                Some(EscalationStage::PatienceSent)
            }
            EscalationStage::PatienceSent if idle >= self.final_after => {
                Some(EscalationStage::FinalSent)
            }
            _ => None,
        }
    }
}

/// Summary of one scheduler pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub scanned: usize,
    pub advanced: Vec<(ConversationKey, EscalationStage)>,
    pub failed: usize,
}

/// Scans open conversations and advances stalled ones.
pub struct EscalationScheduler {
    store: Arc<dyn ConversationStore>,
    machine: Arc<ConversationStateMachine>,
    channels: Arc<ChannelRegistry>,
    policy: EscalationPolicy,
    patience_message: String,
    final_message: String,
    backup_contact: Option<String>,
}

impl EscalationScheduler {
    pub fn new(
        config: &EscalationConfig,
        notify: &NotifyConfig,
        store: Arc<dyn ConversationStore>,
        machine: Arc<ConversationStateMachine>,
        channels: Arc<ChannelRegistry>,
    ) -> Self {
        Self {
            store,
            machine,
            channels,
            policy: EscalationPolicy::from_config(config),
            patience_message: config.patience_message.clone(),
            final_message: config.final_message.clone(),
            backup_contact: notify.backup_contact.clone(),
        }
    }

    pub fn policy(&self) -> EscalationPolicy {
        self.policy
    }

    /// Run one pass using the current time.
    pub async fn tick(&self) -> Result<TickReport, HandoffError> {
        self.tick_at(Utc::now()).await
    }

    /// Run one pass as if the time were `now`.
    ///
    /// Only the initial listing can fail the tick; a failure on one
    /// conversation is logged and the pass continues with the rest.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> Result<TickReport, HandoffError> {
        let open = self.store.list_open_conversations().await?;
        let mut report = TickReport {
            scanned: open.len(),
            ..TickReport::default()
        };

        for conversation in &open {
            let Some(to) = self.policy.next_stage(conversation, now) else {
                continue;
            };
            let key = conversation.key();
            match self.escalate(conversation, to, now).await {
                Ok(true) => report.advanced.push((key, to)),
                Ok(false) => {}
                Err(e) => {
                    error!(%key, stage = %to, error = %e, "escalation failed for conversation");
                    report.failed += 1;
                }
            }
        }

        debug!(
            scanned = report.scanned,
            advanced = report.advanced.len(),
            failed = report.failed,
            "escalation tick complete"
        );
        Ok(report)
    }

    async fn escalate(
        &self,
        conversation: &Conversation,
        to: EscalationStage,
        now: DateTime<Utc>,
    ) -> Result<bool, HandoffError> {
        let text = match to {
            EscalationStage::FinalSent => &self.final_message,
            _ => &self.patience_message,
        };
        if !self.machine.escalate(conversation, to, text, now).await? {
            return Ok(false);
        }

        let key = conversation.key();
        if let Some(kind) = key.kind()
            && kind.is_outward()
        {
            self.channels.dispatch(kind, &key.user_id, text);
        }

        if to == EscalationStage::FinalSent
            && let Some(backup) = &self.backup_contact
        {
            let alert = format!(
                "No staff has picked up {} on {}. The visitor was asked to leave contact details.",
                key.user_id, key.channel
            );
            self.channels.dispatch(ChannelKind::Sms, backup, &alert);
        }
        Ok(true)
    }
}
