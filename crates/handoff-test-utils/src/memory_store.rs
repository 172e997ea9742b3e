// SPDX-FileCopyrightText: 2026 Handoff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory `ConversationStore`.
//!
//! Guards are evaluated through [`Conversation::apply`] under a single mutex,
//! which gives the same compare-and-set behavior as the SQLite store.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use handoff_core::{
    AdapterType, ClosedConversation, Conversation, ConversationKey, ConversationStore, ConversationUpdate,
    EscalationStage, Followup, HandoffError, HealthStatus, Message, NewFollowup, PluginAdapter,
    StageTransition,
};

#[derive(Default)]
struct Inner {
    conversations: HashMap<ConversationKey, Conversation>,
    messages: Vec<Message>,
    followups: Vec<Followup>,
    failing_keys: HashSet<ConversationKey>,
}

/// Conversation store held entirely in memory.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with `StorageUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make `advance_stage` fail for one conversation only.
    pub async fn fail_advance_for(&self, key: &ConversationKey) {
        self.inner.lock().await.failing_keys.insert(key.clone());
    }

    /// Overwrite a stored conversation. Lets tests backdate `updated_at`.
    pub async fn put(&self, conversation: Conversation) {
        self.inner
            .lock()
            .await
            .conversations
            .insert(conversation.key(), conversation);
    }

    fn check(&self) -> Result<(), HandoffError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(HandoffError::StorageUnavailable {
                source: "memory store marked unavailable".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PluginAdapter for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, HandoffError> {
        Ok(match self.check() {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        })
    }

    async fn shutdown(&self) -> Result<(), HandoffError> {
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn initialize(&self) -> Result<(), HandoffError> {
        self.check()
    }

    async fn create_or_get_conversation(
        &self,
        key: &ConversationKey,
        at: DateTime<Utc>,
    ) -> Result<(Conversation, bool), HandoffError> {
        self.check()?;
        let mut inner = self.inner.lock().await;
        if let Some(existing) = inner.conversations.get(key) {
            return Ok((existing.clone(), false));
        }
        let created = Conversation::new(key, at);
        inner.conversations.insert(key.clone(), created.clone());
        Ok((created, true))
    }

    async fn get_conversation(
        &self,
        key: &ConversationKey,
    ) -> Result<Option<Conversation>, HandoffError> {
        self.check()?;
        Ok(self.inner.lock().await.conversations.get(key).cloned())
    }

    async fn update_conversation(
        &self,
        key: &ConversationKey,
        update: &ConversationUpdate,
    ) -> Result<bool, HandoffError> {
        self.check()?;
        let mut inner = self.inner.lock().await;
        let Some(stored) = inner.conversations.get_mut(key) else {
            return Ok(false);
        };
        Ok(stored.apply(update))
    }

    async fn append_message(&self, message: &Message) -> Result<(), HandoffError> {
        self.check()?;
        self.inner.lock().await.messages.push(message.clone());
        Ok(())
    }

    async fn advance_stage(
        &self,
        key: &ConversationKey,
        transition: &StageTransition,
    ) -> Result<bool, HandoffError> {
        self.check()?;
        let mut inner = self.inner.lock().await;
        if inner.failing_keys.contains(key) {
            return Err(HandoffError::StorageUnavailable {
                source: format!("injected failure for {key}").into(),
            });
        }
        let Some(stored) = inner.conversations.get_mut(key) else {
            return Ok(false);
        };
        if !transition.still_applies(stored) {
            return Ok(false);
        }
        stored.escalation_stage = transition.to;
        stored.escalated_at = Some(transition.at);
        inner.messages.push(transition.notice.clone());
        Ok(true)
    }

    async fn list_open_conversations(&self) -> Result<Vec<Conversation>, HandoffError> {
        self.check()?;
        let inner = self.inner.lock().await;
        let mut open: Vec<_> = inner
            .conversations
            .values()
            .filter(|c| c.open)
            .cloned()
            .collect();
        open.sort_by_key(|c| c.updated_at);
        Ok(open)
    }

    async fn list_closed_conversations(&self) -> Result<Vec<ClosedConversation>, HandoffError> {
        self.check()?;
        let inner = self.inner.lock().await;
        let mut closed: Vec<_> = inner
            .conversations
            .values()
            .filter(|c| !c.open)
            .map(|c| ClosedConversation {
                user_id: c.user_id.clone(),
                channel: c.channel.clone(),
                handled_by: c.handled_by.clone(),
                created_at: c.created_at,
                updated_at: c.updated_at,
                closed_at: c.closed_at,
                message_count: inner
                    .messages
                    .iter()
                    .filter(|m| m.user_id == c.user_id && m.channel == c.channel)
                    .count() as u64,
            })
            .collect();
        closed.sort_by_key(|c| std::cmp::Reverse(c.closed_at.unwrap_or(c.updated_at)));
        Ok(closed)
    }

    async fn list_messages(&self, key: &ConversationKey) -> Result<Vec<Message>, HandoffError> {
        self.check()?;
        Ok(self
            .inner
            .lock()
            .await
            .messages
            .iter()
            .filter(|m| m.user_id == key.user_id && m.channel == key.channel)
            .cloned()
            .collect())
    }

    async fn create_followup(&self, followup: &NewFollowup) -> Result<i64, HandoffError> {
        self.check()?;
        let mut inner = self.inner.lock().await;
        let id = inner.followups.len() as i64 + 1;
        inner.followups.push(Followup {
            id,
            user_id: followup.user_id.clone(),
            channel: followup.channel.clone(),
            contact: followup.contact.clone(),
            message: followup.message.clone(),
            created_at: followup.created_at,
            resolved: false,
            viewed: false,
        });
        Ok(id)
    }

    async fn list_followups(&self, unresolved_only: bool) -> Result<Vec<Followup>, HandoffError> {
        self.check()?;
        let inner = self.inner.lock().await;
        Ok(inner
            .followups
            .iter()
            .rev()
            .filter(|f| !unresolved_only || !f.resolved)
            .cloned()
            .collect())
    }

    async fn resolve_followup(&self, id: i64) -> Result<bool, HandoffError> {
        self.check()?;
        let mut inner = self.inner.lock().await;
        match inner.followups.iter_mut().find(|f| f.id == id) {
            Some(f) => {
                f.resolved = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_followup_viewed(&self, id: i64) -> Result<bool, HandoffError> {
        self.check()?;
        let mut inner = self.inner.lock().await;
        match inner.followups.iter_mut().find(|f| f.id == id) {
            Some(f) => {
                f.viewed = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count_unviewed_followups(&self) -> Result<u64, HandoffError> {
        self.check()?;
        let inner = self.inner.lock().await;
        Ok(inner.followups.iter().filter(|f| !f.viewed).count() as u64)
    }
}

impl MemoryStore {
    /// Current stage of a conversation, for terse assertions.
    pub async fn stage_of(&self, key: &ConversationKey) -> Option<EscalationStage> {
        self.inner
            .lock()
            .await
            .conversations
            .get(key)
            .map(|c| c.escalation_stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use handoff_core::SenderRole;

    #[tokio::test]
    async fn advance_stage_honors_guards() {
        let store = MemoryStore::new();
        let key = ConversationKey::new("u", "webchat");
        let now = Utc::now();
        store.create_or_get_conversation(&key, now).await.unwrap();

        let transition = StageTransition {
            from: EscalationStage::None,
            to: EscalationStage::PatienceSent,
            observed_updated_at: now,
            at: now,
            notice: Message::new(&key, SenderRole::System, "wait", now),
        };
        assert!(store.advance_stage(&key, &transition).await.unwrap());
        assert!(!store.advance_stage(&key, &transition).await.unwrap());
        assert_eq!(store.stage_of(&key).await, Some(EscalationStage::PatienceSent));
        assert_eq!(store.list_messages(&key).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn advance_stage_rejects_touched_conversation() {
        let store = MemoryStore::new();
        let key = ConversationKey::new("u", "webchat");
        let now = Utc::now();
        let (stale, _) = store.create_or_get_conversation(&key, now).await.unwrap();

        let later = now + chrono::Duration::seconds(5);
        store
            .update_conversation(&key, &ConversationUpdate::new().touched(later))
            .await
            .unwrap();

        let notice = Message::new(&key, SenderRole::System, "wait", later);
        let transition = StageTransition::from_observed(&stale, EscalationStage::PatienceSent, notice);
        assert!(!store.advance_stage(&key, &transition).await.unwrap());
        assert_eq!(store.stage_of(&key).await, Some(EscalationStage::None));
        assert!(store.list_messages(&key).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unavailable_store_errors() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        let err = store.list_open_conversations().await.unwrap_err();
        assert!(err.is_storage());
    }
}
