// SPDX-FileCopyrightText: 2026 Handoff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Coordination core for human handoff.
//!
//! Ties together the conversation state machine, the escalation scheduler,
//! the fan-out hub, and the message router behind a single [`Coordinator`]
//! that the HTTP/WebSocket layer and the binary drive.

pub mod channels;
pub mod contact;
pub mod escalation;
pub mod hub;
pub mod rate_limit;
pub mod router;
pub mod state_machine;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use handoff_config::HandoffConfig;
use handoff_core::events::ConversationSnapshot;
use handoff_core::{
    ClosedConversation, ConversationKey, ConversationStore, Followup, HandoffError, HubEvent, Message, SenderRole,
    StaffIdentity,
};

pub use channels::ChannelRegistry;
pub use escalation::{EscalationPolicy, EscalationScheduler, TickReport};
pub use hub::{Delivery, FanoutHub, FrameSender, SocketId};
pub use rate_limit::RateLimiter;
pub use router::{InboundOutcome, MessageRouter, RouterSettings};
pub use state_machine::{ConversationStateMachine, InboundRecord};

/// One row of the dashboard history: a closed conversation or a handled follow-up.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum HistoryEntry {
    Conversation(ClosedConversation),
    Followup(Followup),
}

impl HistoryEntry {
    /// When the entry left the live queue.
    pub fn finished_at(&self) -> DateTime<Utc> {
        match self {
            HistoryEntry::Conversation(c) => c.closed_at.unwrap_or(c.updated_at),
            HistoryEntry::Followup(f) => f.created_at,
        }
    }
}

/// The exposed surface of the coordination core.
pub struct Coordinator {
    store: Arc<dyn ConversationStore>,
    hub: Arc<FanoutHub>,
    machine: Arc<ConversationStateMachine>,
    scheduler: Arc<EscalationScheduler>,
    limiter: Arc<RateLimiter>,
    channels: Arc<ChannelRegistry>,
    router: MessageRouter,
    followup_ack: String,
}

impl Coordinator {
    pub fn new(
        config: &HandoffConfig,
        store: Arc<dyn ConversationStore>,
        channels: ChannelRegistry,
    ) -> Self {
        let hub = Arc::new(FanoutHub::new());
        let channels = Arc::new(channels);
        let limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));
        let machine = Arc::new(ConversationStateMachine::new(store.clone(), hub.clone()));
        let scheduler = Arc::new(EscalationScheduler::new(
            &config.escalation,
            &config.notify,
            store.clone(),
            machine.clone(),
            channels.clone(),
        ));
        let router = MessageRouter::new(
            machine.clone(),
            hub.clone(),
            limiter.clone(),
            channels.clone(),
            RouterSettings::from_config(config),
        );

        Self {
            store,
            hub,
            machine,
            scheduler,
            limiter,
            channels,
            router,
            followup_ack: config.escalation.followup_ack_message.clone(),
        }
    }

    pub fn hub(&self) -> &Arc<FanoutHub> {
        &self.hub
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    /// The scheduler, for single passes at an explicit time.
    pub fn scheduler(&self) -> Arc<EscalationScheduler> {
        self.scheduler.clone()
    }

    pub fn router(&self) -> &MessageRouter {
        &self.router
    }

    pub async fn handle_inbound(
        &self,
        channel: &str,
        user_id: &str,
        text: &str,
    ) -> Result<InboundOutcome, HandoffError> {
        self.router.handle_inbound(channel, user_id, text).await
    }

    /// Record a staff reply and deliver it to the visitor.
    ///
    /// Webchat visitors receive it through the hub; other channels get an
    /// outbound send to the user's address.
    pub async fn handle_staff_reply(
        &self,
        user_id: &str,
        channel: &str,
        text: &str,
        staff: Option<&StaffIdentity>,
    ) -> Result<Message, HandoffError> {
        let key = ConversationKey::new(user_id, channel);
        let message = self
            .machine
            .record_staff_reply(&key, text, staff, Utc::now())
            .await?;
        if let Some(kind) = key.kind()
            && kind.is_outward()
        {
            self.channels.dispatch(kind, user_id, text);
        }
        Ok(message)
    }

    /// Close a conversation. Returns `false` when it was already closed.
    pub async fn handle_close(&self, user_id: &str, channel: &str) -> Result<bool, HandoffError> {
        self.machine
            .close(&ConversationKey::new(user_id, channel), Utc::now())
            .await
    }

    pub async fn handle_assign(
        &self,
        user_id: &str,
        channel: &str,
        staff: &StaffIdentity,
    ) -> Result<bool, HandoffError> {
        self.machine
            .assign(&ConversationKey::new(user_id, channel), staff, Utc::now())
            .await
    }

    /// Store contact details submitted directly (e.g. an offline form) and
    /// close the conversation.
    pub async fn handle_followup(
        &self,
        user_id: &str,
        channel: &str,
        contact: Option<String>,
        message: &str,
    ) -> Result<i64, HandoffError> {
        let key = ConversationKey::new(user_id, channel);
        self.require(&key).await?;
        self.machine
            .capture_followup(&key, contact, message, &self.followup_ack, Utc::now())
            .await
    }

    /// Ordered messages of one conversation.
    pub async fn transcript(&self, user_id: &str, channel: &str) -> Result<Vec<Message>, HandoffError> {
        let key = ConversationKey::new(user_id, channel);
        self.require(&key).await?;
        self.store.list_messages(&key).await
    }

    pub async fn followups(&self, unresolved_only: bool) -> Result<Vec<Followup>, HandoffError> {
        self.store.list_followups(unresolved_only).await
    }

    /// Mark a follow-up handled. Returns `false` for an unknown id.
    pub async fn resolve_followup(&self, id: i64) -> Result<bool, HandoffError> {
        let resolved = self.store.resolve_followup(id).await?;
        if resolved {
            info!(followup_id = id, "follow-up resolved");
        }
        Ok(resolved)
    }

    /// Flag a follow-up as opened on the dashboard. Returns `false` for an unknown id.
    pub async fn mark_followup_viewed(&self, id: i64) -> Result<bool, HandoffError> {
        self.store.mark_followup_viewed(id).await
    }

    /// Follow-ups nobody has opened yet; drives the dashboard badge.
    pub async fn unviewed_followups(&self) -> Result<u64, HandoffError> {
        self.store.count_unviewed_followups().await
    }

    /// Closed conversations and resolved follow-ups, newest first.
    pub async fn history(&self) -> Result<Vec<HistoryEntry>, HandoffError> {
        let mut entries: Vec<HistoryEntry> = self
            .store
            .list_closed_conversations()
            .await?
            .into_iter()
            .map(HistoryEntry::Conversation)
            .collect();
        entries.extend(
            self.store
                .list_followups(false)
                .await?
                .into_iter()
                .filter(|f| f.resolved)
                .map(HistoryEntry::Followup),
        );
        entries.sort_by_key(|e| std::cmp::Reverse(e.finished_at()));
        Ok(entries)
    }

    /// Every open conversation with its transcript.
    pub async fn snapshot(&self) -> Result<Vec<ConversationSnapshot>, HandoffError> {
        let open = self.store.list_open_conversations().await?;
        let mut snapshots = Vec::with_capacity(open.len());
        for conversation in open {
            let messages = self.store.list_messages(&conversation.key()).await?;
            snapshots.push(ConversationSnapshot {
                conversation,
                messages,
            });
        }
        Ok(snapshots)
    }

    pub fn register_user_socket(&self, user_id: &str, channel: &str, tx: FrameSender) -> SocketId {
        self.hub.register_user(&ConversationKey::new(user_id, channel), tx)
    }

    pub fn unregister_user_socket(&self, user_id: &str, channel: &str, id: SocketId) {
        self.hub
            .unregister_user(&ConversationKey::new(user_id, channel), id);
    }

    /// Register an admin socket and replay the current open conversations to it.
    ///
    /// The socket joins the broadcast group before the snapshot is read, so
    /// nothing published in between is lost; at worst it is seen twice.
    pub async fn register_admin_socket(
        &self,
        identity: StaffIdentity,
        tx: FrameSender,
    ) -> Result<SocketId, HandoffError> {
        let name = identity.name.clone();
        let id = self.hub.register_admin(identity, tx);
        let conversations = match self.snapshot().await {
            Ok(conversations) => conversations,
            Err(e) => {
                self.hub.unregister_admin(id);
                return Err(e);
            }
        };
        debug!(socket = %id, staff = %name, open = conversations.len(), "replaying snapshot");
        self.hub
            .send_to_admin(id, &HubEvent::Snapshot { conversations });
        Ok(id)
    }

    pub fn unregister_admin_socket(&self, id: SocketId) {
        self.hub.unregister_admin(id);
    }

    /// Relay a typing indicator for one conversation.
    ///
    /// Visitor typing reaches admins only; staff typing reaches the
    /// visitor's sockets and the other admins.
    pub fn relay_typing(&self, user_id: &str, channel: &str, sender: SenderRole, active: bool) -> Delivery {
        let event = if active {
            HubEvent::TypingStart { sender }
        } else {
            HubEvent::TypingStop { sender }
        };
        self.hub
            .publish(&ConversationKey::new(user_id, channel), &event)
    }

    /// One escalation pass, plus housekeeping of idle rate-limit state.
    pub async fn tick_escalation(&self) -> Result<TickReport, HandoffError> {
        let report = self.scheduler.tick().await?;
        let pruned = self.limiter.prune_idle();
        if pruned > 0 {
            debug!(pruned, "idle rate-limit windows dropped");
        }
        Ok(report)
    }

    /// Call [`Coordinator::tick_escalation`] every `interval` until `cancel`
    /// fires. A failed tick is logged and retried on the next interval.
    pub async fn run_escalation(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // Skip the first immediate tick.
        ticker.tick().await;
        info!(interval_secs = interval.as_secs(), "escalation driver started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.tick_escalation().await {
                        Ok(report) if !report.advanced.is_empty() => {
                            info!(advanced = report.advanced.len(), failed = report.failed, "conversations escalated");
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "escalation tick failed, retrying next interval"),
                    }
                }
                _ = cancel.cancelled() => {
                    info!("escalation driver shutting down");
                    break;
                }
            }
        }
    }

    /// Wait for queued outbound channel sends to finish.
    pub async fn settle_deliveries(&self) {
        self.channels.settle().await;
    }

    async fn require(&self, key: &ConversationKey) -> Result<(), HandoffError> {
        match self.store.get_conversation(key).await? {
            Some(_) => Ok(()),
            None => Err(HandoffError::NotFound {
                user_id: key.user_id.clone(),
                channel: key.channel.clone(),
            }),
        }
    }
}
