// SPDX-FileCopyrightText: 2026 Handoff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the ConversationStore trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::debug;

use handoff_config::model::StorageConfig;
use handoff_core::{
    AdapterType, ClosedConversation, Conversation, ConversationKey, ConversationStore, ConversationUpdate, Followup,
    HandoffError, HealthStatus, Message, NewFollowup, PluginAdapter, StageTransition,
};

use crate::database::Database;
use crate::queries;

/// SQLite-backed conversation store.
///
/// The database is opened on the first call to
/// [`ConversationStore::initialize`]; every other operation fails with
/// `StorageUnavailable` until then.
pub struct SqliteStore {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStore {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Wrap an already-open database (e.g. an in-memory one in tests).
    pub fn with_database(db: Database) -> Self {
        Self {
            config: StorageConfig {
                database_path: ":memory:".to_string(),
                wal_mode: false,
            },
            db: OnceCell::new_with(Some(db)),
        }
    }

    fn db(&self) -> Result<&Database, HandoffError> {
        self.db.get().ok_or_else(|| HandoffError::StorageUnavailable {
            source: "storage not initialized; call initialize() first".into(),
        })
    }
}

#[async_trait]
impl PluginAdapter for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, HandoffError> {
        let Ok(db) = self.db() else {
            return Ok(HealthStatus::Unhealthy("not initialized".to_string()));
        };
        let reachable = db
            .connection()
            .call(|conn| conn.execute_batch("SELECT 1;"))
            .await;
        Ok(match reachable {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        })
    }

    async fn shutdown(&self) -> Result<(), HandoffError> {
        if let Some(db) = self.db.get()
            && self.config.wal_mode
        {
            db.checkpoint().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn initialize(&self) -> Result<(), HandoffError> {
        if self.db.initialized() {
            return Ok(());
        }
        let db = Database::open(&self.config.database_path, self.config.wal_mode).await?;
        self.db
            .set(db)
            .map_err(|_| HandoffError::Internal("storage initialized concurrently".to_string()))?;
        debug!(path = %self.config.database_path, "SQLite store initialized");
        Ok(())
    }

    async fn create_or_get_conversation(
        &self,
        key: &ConversationKey,
        at: DateTime<Utc>,
    ) -> Result<(Conversation, bool), HandoffError> {
        queries::conversations::create_or_get(self.db()?, key, at).await
    }

    async fn get_conversation(
        &self,
        key: &ConversationKey,
    ) -> Result<Option<Conversation>, HandoffError> {
        queries::conversations::get(self.db()?, key).await
    }

    async fn update_conversation(
        &self,
        key: &ConversationKey,
        update: &ConversationUpdate,
    ) -> Result<bool, HandoffError> {
        queries::conversations::update(self.db()?, key, update).await
    }

    async fn append_message(&self, message: &Message) -> Result<(), HandoffError> {
        queries::messages::append(self.db()?, message).await
    }

    async fn advance_stage(
        &self,
        key: &ConversationKey,
        transition: &StageTransition,
    ) -> Result<bool, HandoffError> {
        queries::conversations::advance_stage(self.db()?, key, transition).await
    }

    async fn list_open_conversations(&self) -> Result<Vec<Conversation>, HandoffError> {
        queries::conversations::list_open(self.db()?).await
    }

    async fn list_closed_conversations(&self) -> Result<Vec<ClosedConversation>, HandoffError> {
        queries::conversations::list_closed(self.db()?).await
    }

    async fn list_messages(&self, key: &ConversationKey) -> Result<Vec<Message>, HandoffError> {
        queries::messages::list_for_conversation(self.db()?, key).await
    }

    async fn create_followup(&self, followup: &NewFollowup) -> Result<i64, HandoffError> {
        queries::followups::create(self.db()?, followup).await
    }

    async fn list_followups(&self, unresolved_only: bool) -> Result<Vec<Followup>, HandoffError> {
        queries::followups::list(self.db()?, unresolved_only).await
    }

    async fn resolve_followup(&self, id: i64) -> Result<bool, HandoffError> {
        queries::followups::resolve(self.db()?, id).await
    }

    async fn mark_followup_viewed(&self, id: i64) -> Result<bool, HandoffError> {
        queries::followups::mark_viewed(self.db()?, id).await
    }

    async fn count_unviewed_followups(&self) -> Result<u64, HandoffError> {
        queries::followups::count_unviewed(self.db()?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use handoff_core::{EscalationStage, SenderRole};
    use tempfile::tempdir;

    async fn memory_store() -> SqliteStore {
        SqliteStore::with_database(Database::open_in_memory().await.unwrap())
    }

    fn key() -> ConversationKey {
        ConversationKey::new("visitor-1", "webchat")
    }

    #[tokio::test]
    async fn uninitialized_store_reports_storage_error() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::new(StorageConfig {
            database_path: dir.path().join("x.db").display().to_string(),
            wal_mode: true,
        });
        let err = store.get_conversation(&key()).await.unwrap_err();
        assert!(err.is_storage());
        assert!(matches!(
            store.health_check().await.unwrap(),
            HealthStatus::Unhealthy(_)
        ));

        store.initialize().await.unwrap();
        assert_eq!(store.health_check().await.unwrap(), HealthStatus::Healthy);
        store.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn create_or_get_creates_once() {
        let store = memory_store().await;
        let now = Utc::now();

        let (first, created) = store.create_or_get_conversation(&key(), now).await.unwrap();
        assert!(created);
        assert!(first.open);
        assert_eq!(first.escalation_stage, EscalationStage::None);

        let later = now + Duration::seconds(5);
        let (second, created) = store.create_or_get_conversation(&key(), later).await.unwrap();
        assert!(!created);
        assert_eq!(second.created_at, first.created_at);
    }

    #[tokio::test]
    async fn guarded_update_rejects_stale_stage() {
        let store = memory_store().await;
        store.create_or_get_conversation(&key(), Utc::now()).await.unwrap();

        let stale = ConversationUpdate::new()
            .expect_stage(EscalationStage::PatienceSent)
            .stage(EscalationStage::FinalSent);
        assert!(!store.update_conversation(&key(), &stale).await.unwrap());

        let assign = ConversationUpdate::new()
            .expect_open(true)
            .assigned_staff(Some("dana".to_string()));
        assert!(store.update_conversation(&key(), &assign).await.unwrap());
        let stored = store.get_conversation(&key()).await.unwrap().unwrap();
        assert_eq!(stored.assigned_staff.as_deref(), Some("dana"));
        assert_eq!(stored.escalation_stage, EscalationStage::None);
    }

    #[tokio::test]
    async fn update_of_missing_conversation_returns_false() {
        let store = memory_store().await;
        let update = ConversationUpdate::new().open(false);
        assert!(!store.update_conversation(&key(), &update).await.unwrap());
    }

    #[tokio::test]
    async fn advance_stage_is_compare_and_set() {
        let store = memory_store().await;
        let start = Utc::now();
        store.create_or_get_conversation(&key(), start).await.unwrap();

        let at = start + Duration::seconds(40);
        let transition = StageTransition {
            from: EscalationStage::None,
            to: EscalationStage::PatienceSent,
            observed_updated_at: start,
            at,
            notice: Message::new(&key(), SenderRole::System, "hang on", at),
        };
        assert!(store.advance_stage(&key(), &transition).await.unwrap());
        // Replaying the same transition loses the race.
        assert!(!store.advance_stage(&key(), &transition).await.unwrap());

        let stored = store.get_conversation(&key()).await.unwrap().unwrap();
        assert_eq!(stored.escalation_stage, EscalationStage::PatienceSent);
        assert_eq!(stored.escalated_at, Some(at));
        assert_eq!(stored.updated_at, start, "system notices do not count as activity");

        let messages = store.list_messages(&key()).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].sender, SenderRole::System);
    }

    #[tokio::test]
    async fn advance_stage_skips_assigned_and_closed() {
        let store = memory_store().await;
        let now = Utc::now();
        store.create_or_get_conversation(&key(), now).await.unwrap();
        let transition = StageTransition {
            from: EscalationStage::None,
            to: EscalationStage::PatienceSent,
            observed_updated_at: now,
            at: now,
            notice: Message::new(&key(), SenderRole::System, "hang on", now),
        };

        let assign = ConversationUpdate::new().assigned_staff(Some("dana".to_string()));
        store.update_conversation(&key(), &assign).await.unwrap();
        assert!(!store.advance_stage(&key(), &transition).await.unwrap());

        let release_and_close = ConversationUpdate::new().assigned_staff(None).open(false);
        store.update_conversation(&key(), &release_and_close).await.unwrap();
        assert!(!store.advance_stage(&key(), &transition).await.unwrap());
        assert!(store.list_messages(&key()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn advance_stage_rejects_a_stale_activity_clock() {
        let store = memory_store().await;
        let start = Utc::now();
        let (stale, _) = store.create_or_get_conversation(&key(), start).await.unwrap();

        // Close and reopen behind the scheduler's back: stage is `None` again
        // but the idle clock restarted.
        let reopened_at = start + Duration::seconds(60);
        store
            .update_conversation(&key(), &ConversationUpdate::closing(None, start + Duration::seconds(59)))
            .await
            .unwrap();
        let reopen = ConversationUpdate::new()
            .expect_open(false)
            .open(true)
            .stage(EscalationStage::None)
            .closed_at(None)
            .touched(reopened_at);
        assert!(store.update_conversation(&key(), &reopen).await.unwrap());

        let at = reopened_at + Duration::seconds(1);
        let notice = Message::new(&key(), SenderRole::System, "hang on", at);
        let transition = StageTransition::from_observed(&stale, EscalationStage::PatienceSent, notice);
        assert!(!store.advance_stage(&key(), &transition).await.unwrap());

        let stored = store.get_conversation(&key()).await.unwrap().unwrap();
        assert_eq!(stored.escalation_stage, EscalationStage::None);
        assert!(store.list_messages(&key()).await.unwrap().is_empty());

        // Planned against the fresh row, the same step goes through.
        let notice = Message::new(&key(), SenderRole::System, "hang on", at);
        let fresh = StageTransition::from_observed(&stored, EscalationStage::PatienceSent, notice);
        assert!(store.advance_stage(&key(), &fresh).await.unwrap());
    }

    #[tokio::test]
    async fn closed_conversations_list_with_counts() {
        let store = memory_store().await;
        let start = Utc::now();
        let other = ConversationKey::new("+15550001111", "sms");
        store.create_or_get_conversation(&key(), start).await.unwrap();
        store.create_or_get_conversation(&other, start).await.unwrap();
        for text in ["hi", "anyone?"] {
            store
                .append_message(&Message::new(&key(), SenderRole::User, text, start))
                .await
                .unwrap();
        }
        store
            .update_conversation(
                &key(),
                &ConversationUpdate::new().assigned_staff(Some("dana".to_string())),
            )
            .await
            .unwrap();
        let closed_at = start + Duration::seconds(90);
        store
            .update_conversation(&key(), &ConversationUpdate::closing(Some("dana".to_string()), closed_at))
            .await
            .unwrap();

        let history = store.list_closed_conversations().await.unwrap();
        assert_eq!(history.len(), 1, "open conversations stay out of history");
        assert_eq!(history[0].user_id, "visitor-1");
        assert_eq!(history[0].handled_by.as_deref(), Some("dana"));
        assert_eq!(history[0].closed_at, Some(closed_at));
        assert_eq!(history[0].message_count, 2);

        let stored = store.get_conversation(&key()).await.unwrap().unwrap();
        assert!(stored.assigned_staff.is_none());
    }

    #[tokio::test]
    async fn followup_viewed_flag_drives_unviewed_count() {
        let store = memory_store().await;
        let now = Utc::now();
        let mut ids = Vec::new();
        for user in ["a", "b"] {
            let id = store
                .create_followup(&NewFollowup {
                    user_id: user.to_string(),
                    channel: "webchat".to_string(),
                    contact: None,
                    message: "call me".to_string(),
                    created_at: now,
                })
                .await
                .unwrap();
            ids.push(id);
        }
        assert_eq!(store.count_unviewed_followups().await.unwrap(), 2);

        assert!(store.mark_followup_viewed(ids[0]).await.unwrap());
        assert!(store.mark_followup_viewed(ids[0]).await.unwrap());
        assert!(!store.mark_followup_viewed(9999).await.unwrap());
        assert_eq!(store.count_unviewed_followups().await.unwrap(), 1);

        let listed = store.list_followups(false).await.unwrap();
        let first = listed.iter().find(|f| f.id == ids[0]).unwrap();
        assert!(first.viewed);
        assert!(!first.resolved);
    }

    #[tokio::test]
    async fn list_open_excludes_closed() {
        let store = memory_store().await;
        let now = Utc::now();
        let other = ConversationKey::new("+15550001111", "sms");
        store.create_or_get_conversation(&key(), now).await.unwrap();
        store.create_or_get_conversation(&other, now).await.unwrap();
        store
            .update_conversation(&other, &ConversationUpdate::new().open(false))
            .await
            .unwrap();

        let open = store.list_open_conversations().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].key(), key());
    }

    #[tokio::test]
    async fn messages_keep_arrival_order() {
        let store = memory_store().await;
        let now = Utc::now();
        store.create_or_get_conversation(&key(), now).await.unwrap();
        for (i, sender) in [SenderRole::User, SenderRole::System, SenderRole::Staff]
            .into_iter()
            .enumerate()
        {
            let msg = Message::new(&key(), sender, format!("m{i}"), now);
            store.append_message(&msg).await.unwrap();
        }
        let texts: Vec<_> = store
            .list_messages(&key())
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, ["m0", "m1", "m2"]);
    }

    #[tokio::test]
    async fn followup_inbox_lifecycle() {
        let store = memory_store().await;
        let now = Utc::now();
        let first = store
            .create_followup(&NewFollowup {
                user_id: "visitor-1".to_string(),
                channel: "webchat".to_string(),
                contact: Some("me@example.com".to_string()),
                message: "call me".to_string(),
                created_at: now,
            })
            .await
            .unwrap();
        let second = store
            .create_followup(&NewFollowup {
                user_id: "+15550001111".to_string(),
                channel: "sms".to_string(),
                contact: None,
                message: "ring back".to_string(),
                created_at: now,
            })
            .await
            .unwrap();

        let all = store.list_followups(false).await.unwrap();
        assert_eq!(all.iter().map(|f| f.id).collect::<Vec<_>>(), vec![second, first]);

        assert!(store.resolve_followup(first).await.unwrap());
        assert!(!store.resolve_followup(9999).await.unwrap());

        let pending = store.list_followups(true).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, second);
        assert!(!pending[0].resolved);
    }

    #[tokio::test]
    async fn state_survives_reopen() {
        let dir = tempdir().unwrap();
        let config = StorageConfig {
            database_path: dir.path().join("persist.db").display().to_string(),
            wal_mode: true,
        };
        let store = SqliteStore::new(config.clone());
        store.initialize().await.unwrap();
        store.create_or_get_conversation(&key(), Utc::now()).await.unwrap();
        store.shutdown().await.unwrap();
        drop(store);

        let reopened = SqliteStore::new(config);
        reopened.initialize().await.unwrap();
        assert!(reopened.get_conversation(&key()).await.unwrap().is_some());
    }
}
