// SPDX-FileCopyrightText: 2026 Handoff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation store trait for persistence backends.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::HandoffError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    ClosedConversation, Conversation, ConversationKey, ConversationUpdate, Followup, Message, NewFollowup,
    StageTransition,
};

/// Read/write access to conversation, message, and follow-up records.
///
/// Implementations must guarantee at most one record per (user, channel) pair
/// and must apply [`ConversationUpdate`] guards atomically with the write
/// (compare-and-set), so that concurrent writers, including other processes
/// sharing the same store, cannot lose each other's updates.
#[async_trait]
pub trait ConversationStore: PluginAdapter {
    /// Initializes the backend (migrations, connection pool, etc.).
    async fn initialize(&self) -> Result<(), HandoffError>;

    /// Returns the conversation for `key`, creating an open one at `at` if none exists.
    ///
    /// The boolean is `true` when this call created the record.
    async fn create_or_get_conversation(
        &self,
        key: &ConversationKey,
        at: DateTime<Utc>,
    ) -> Result<(Conversation, bool), HandoffError>;

    /// Fetches a conversation without creating it.
    async fn get_conversation(
        &self,
        key: &ConversationKey,
    ) -> Result<Option<Conversation>, HandoffError>;

    /// Applies a guarded partial update.
    ///
    /// Returns `false` if the record is missing or a guard did not match.
    async fn update_conversation(
        &self,
        key: &ConversationKey,
        update: &ConversationUpdate,
    ) -> Result<bool, HandoffError>;

    /// Appends a message to its conversation's log.
    async fn append_message(&self, message: &Message) -> Result<(), HandoffError>;

    /// Advances the escalation stage if it still equals `transition.from`, and
    /// appends the transition notice in the same unit of work.
    ///
    /// Returns `false` (and appends nothing) if the conversation is closed,
    /// assigned, no longer at the expected stage, or has seen activity since
    /// `transition.observed_updated_at`.
    async fn advance_stage(
        &self,
        key: &ConversationKey,
        transition: &StageTransition,
    ) -> Result<bool, HandoffError>;

    /// Lists every conversation with `open = true`.
    async fn list_open_conversations(&self) -> Result<Vec<Conversation>, HandoffError>;

    /// Lists closed conversations with their message counts, most recently closed first.
    async fn list_closed_conversations(&self) -> Result<Vec<ClosedConversation>, HandoffError>;

    /// Lists a conversation's messages in arrival order.
    async fn list_messages(&self, key: &ConversationKey) -> Result<Vec<Message>, HandoffError>;

    /// Persists an offline follow-up and returns its id.
    async fn create_followup(&self, followup: &NewFollowup) -> Result<i64, HandoffError>;

    /// Lists follow-ups, newest first.
    async fn list_followups(&self, unresolved_only: bool) -> Result<Vec<Followup>, HandoffError>;

    /// Marks a follow-up resolved. Returns `false` for an unknown id.
    async fn resolve_followup(&self, id: i64) -> Result<bool, HandoffError>;

    /// Marks a follow-up as opened on the dashboard. Returns `false` for an unknown id.
    async fn mark_followup_viewed(&self, id: i64) -> Result<bool, HandoffError>;

    /// Number of follow-ups nobody has opened yet.
    async fn count_unviewed_followups(&self) -> Result<u64, HandoffError>;
}
