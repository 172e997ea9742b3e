// SPDX-FileCopyrightText: 2026 Handoff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end behavior of the coordinator against the in-memory store.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::Value;
use tokio::sync::mpsc;

use handoff_config::HandoffConfig;
use handoff_coordinator::{ChannelRegistry, Coordinator, HistoryEntry, InboundOutcome};
use handoff_core::{
    ChannelKind, ConversationKey, ConversationStore, EscalationStage, HandoffError, SenderRole,
    StaffIdentity, StaffRole,
};
use handoff_test_utils::{MemoryStore, MockChannel};

const BACKUP: &str = "+15550009999";

struct Harness {
    store: Arc<MemoryStore>,
    sms: Arc<MockChannel>,
    coordinator: Coordinator,
}

fn harness() -> Harness {
    let mut config = HandoffConfig::default();
    config.notify.backup_contact = Some(BACKUP.to_string());
    let store = Arc::new(MemoryStore::new());
    let sms = Arc::new(MockChannel::new(ChannelKind::Sms));
    let channels = ChannelRegistry::new().with(sms.clone());
    let coordinator = Coordinator::new(&config, store.clone(), channels);
    Harness {
        store,
        sms,
        coordinator,
    }
}

fn alice() -> ConversationKey {
    ConversationKey::new("alice", "webchat")
}

fn dana() -> StaffIdentity {
    StaffIdentity {
        name: "dana".to_string(),
        role: StaffRole::Staff,
    }
}

fn frame(raw: String) -> Value {
    serde_json::from_str(&raw).unwrap()
}

#[tokio::test]
async fn first_message_greets_only_the_visitor_socket() {
    let h = harness();
    let (user_tx, mut user_rx) = mpsc::channel(16);
    let (admin_tx, mut admin_rx) = mpsc::channel(16);
    h.coordinator.register_user_socket("alice", "webchat", user_tx);
    h.coordinator
        .register_admin_socket(dana(), admin_tx)
        .await
        .unwrap();
    // Empty snapshot on connect.
    let snapshot = frame(admin_rx.recv().await.unwrap());
    assert_eq!(snapshot["type"], "snapshot");

    let outcome = h.coordinator.handle_inbound("webchat", "alice", "hello").await.unwrap();
    assert!(matches!(
        outcome,
        InboundOutcome::Accepted {
            first_message: true,
            ..
        }
    ));

    let conversation = h.store.get_conversation(&alice()).await.unwrap().unwrap();
    assert!(conversation.open);
    assert_eq!(conversation.escalation_stage, EscalationStage::None);

    let greeting = frame(user_rx.recv().await.unwrap());
    assert_eq!(greeting["type"], "system_message");
    assert!(user_rx.try_recv().is_err(), "visitor must not get their own message echoed");

    let admin_event = frame(admin_rx.recv().await.unwrap());
    assert_eq!(admin_event["type"], "user_message");
    assert_eq!(admin_event["user_id"], "alice");
    assert!(admin_rx.try_recv().is_err(), "greeting must not reach admins");
}

#[tokio::test]
async fn idle_conversation_gets_one_patience_notice() {
    let h = harness();
    h.coordinator.handle_inbound("webchat", "alice", "hello").await.unwrap();
    let scheduler = h.coordinator.scheduler();

    let now = Utc::now();
    let report = scheduler.tick_at(now + Duration::seconds(31)).await.unwrap();
    assert_eq!(report.advanced, vec![(alice(), EscalationStage::PatienceSent)]);

    let report = scheduler.tick_at(now + Duration::seconds(32)).await.unwrap();
    assert!(report.advanced.is_empty());

    let system: Vec<_> = h
        .store
        .list_messages(&alice())
        .await
        .unwrap()
        .into_iter()
        .filter(|m| m.sender == SenderRole::System)
        .collect();
    assert_eq!(system.len(), 1);
    let conversation = h.store.get_conversation(&alice()).await.unwrap().unwrap();
    assert!(conversation.escalated_at.is_some());
}

#[tokio::test]
async fn final_notice_follows_patience_and_pages_backup_once() {
    let h = harness();
    h.coordinator.handle_inbound("webchat", "alice", "hello").await.unwrap();
    let scheduler = h.coordinator.scheduler();
    let now = Utc::now();

    // Long idle still only takes one step per tick.
    let first = scheduler.tick_at(now + Duration::seconds(400)).await.unwrap();
    assert_eq!(first.advanced, vec![(alice(), EscalationStage::PatienceSent)]);
    let second = scheduler.tick_at(now + Duration::seconds(401)).await.unwrap();
    assert_eq!(second.advanced, vec![(alice(), EscalationStage::FinalSent)]);
    scheduler.tick_at(now + Duration::seconds(900)).await.unwrap();

    h.coordinator.settle_deliveries().await;
    assert_eq!(h.sms.sent_to(BACKUP).await.len(), 1);
    assert_eq!(h.store.stage_of(&alice()).await, Some(EscalationStage::FinalSent));
}

#[tokio::test]
async fn assigned_conversation_never_escalates() {
    let h = harness();
    h.coordinator.handle_inbound("webchat", "alice", "hello").await.unwrap();
    assert!(h.coordinator.handle_assign("alice", "webchat", &dana()).await.unwrap());

    let report = h
        .coordinator
        .scheduler()
        .tick_at(Utc::now() + Duration::seconds(3600))
        .await
        .unwrap();
    assert!(report.advanced.is_empty());

    let transcript = h.coordinator.transcript("alice", "webchat").await.unwrap();
    assert_eq!(transcript.last().unwrap().text, "dana joined the conversation.");
}

#[tokio::test]
async fn staff_reply_suppresses_escalation_until_reopen() {
    let h = harness();
    h.coordinator.handle_inbound("webchat", "alice", "hello").await.unwrap();
    h.coordinator
        .handle_staff_reply("alice", "webchat", "Hi, I'm here", Some(&dana()))
        .await
        .unwrap();
    assert_eq!(h.store.stage_of(&alice()).await, Some(EscalationStage::Terminated));

    let scheduler = h.coordinator.scheduler();
    let report = scheduler.tick_at(Utc::now() + Duration::seconds(3600)).await.unwrap();
    assert!(report.advanced.is_empty());

    assert!(h.coordinator.handle_close("alice", "webchat").await.unwrap());
    h.coordinator.handle_inbound("webchat", "alice", "new question").await.unwrap();
    let conversation = h.store.get_conversation(&alice()).await.unwrap().unwrap();
    assert!(conversation.open);
    assert_eq!(conversation.escalation_stage, EscalationStage::None);

    let report = scheduler.tick_at(Utc::now() + Duration::seconds(31)).await.unwrap();
    assert_eq!(report.advanced.len(), 1);
}

#[tokio::test]
async fn seventh_message_in_window_is_throttled() {
    let h = harness();
    let mut rejected = 0;
    for i in 0..7 {
        let outcome = h
            .coordinator
            .handle_inbound("webchat", "bob", &format!("msg {i}"))
            .await
            .unwrap();
        if outcome.is_rate_limited() {
            rejected += 1;
        }
    }
    assert_eq!(rejected, 1);
    let transcript = h.coordinator.transcript("bob", "webchat").await.unwrap();
    assert_eq!(transcript.len(), 6);
}

#[tokio::test]
async fn reply_after_final_notice_is_captured_as_followup() {
    let h = harness();
    h.coordinator.handle_inbound("webchat", "alice", "hello").await.unwrap();
    let scheduler = h.coordinator.scheduler();
    let now = Utc::now();
    scheduler.tick_at(now + Duration::seconds(31)).await.unwrap();
    scheduler.tick_at(now + Duration::seconds(181)).await.unwrap();

    let outcome = h
        .coordinator
        .handle_inbound("webchat", "alice", "email me at alice@example.com")
        .await
        .unwrap();
    let InboundOutcome::Accepted { followup_id, .. } = outcome else {
        panic!("follow-up text must not be throttled");
    };
    let id = followup_id.expect("follow-up should be captured");

    let followups = h.coordinator.followups(true).await.unwrap();
    assert_eq!(followups.len(), 1);
    assert_eq!(followups[0].id, id);
    assert_eq!(followups[0].contact.as_deref(), Some("alice@example.com"));
    assert!(!h.store.get_conversation(&alice()).await.unwrap().unwrap().open);

    assert!(h.coordinator.resolve_followup(id).await.unwrap());
    assert!(h.coordinator.followups(true).await.unwrap().is_empty());
    assert!(!h.coordinator.resolve_followup(id + 100).await.unwrap());
}

#[tokio::test]
async fn history_merges_closed_conversations_and_resolved_followups() {
    let h = harness();
    h.coordinator.handle_inbound("webchat", "alice", "hello").await.unwrap();
    h.coordinator.handle_assign("alice", "webchat", &dana()).await.unwrap();
    h.coordinator.handle_close("alice", "webchat").await.unwrap();

    h.coordinator.handle_inbound("webchat", "bob", "hi").await.unwrap();
    let followup = h
        .coordinator
        .handle_followup("bob", "webchat", Some("bob@example.com".into()), "call me")
        .await
        .unwrap();
    h.coordinator.handle_inbound("webchat", "carol", "still open").await.unwrap();

    // Unresolved follow-ups are still live work, not history.
    let history = h.coordinator.history().await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history
        .iter()
        .all(|e| matches!(e, HistoryEntry::Conversation(_))));

    h.coordinator.resolve_followup(followup).await.unwrap();
    let history = h.coordinator.history().await.unwrap();
    assert_eq!(history.len(), 3);
    assert!(history
        .windows(2)
        .all(|pair| pair[0].finished_at() >= pair[1].finished_at()));

    let alice_entry = history
        .iter()
        .find_map(|e| match e {
            HistoryEntry::Conversation(c) if c.user_id == "alice" => Some(c),
            _ => None,
        })
        .unwrap();
    assert_eq!(alice_entry.handled_by.as_deref(), Some("dana"));
    assert!(alice_entry.closed_at.is_some());
    // hello, joined notice, closed notice
    assert_eq!(alice_entry.message_count, 3);

    let json = serde_json::to_value(&history).unwrap();
    assert!(json
        .as_array()
        .unwrap()
        .iter()
        .any(|e| e["source"] == "followup" && e["contact"] == "bob@example.com"));
}

#[tokio::test]
async fn opening_a_followup_clears_it_from_the_unviewed_count() {
    let h = harness();
    let mut ids = Vec::new();
    for user in ["alice", "bob"] {
        h.coordinator.handle_inbound("webchat", user, "hi").await.unwrap();
        ids.push(
            h.coordinator
                .handle_followup(user, "webchat", None, "call me")
                .await
                .unwrap(),
        );
    }
    assert_eq!(h.coordinator.unviewed_followups().await.unwrap(), 2);

    assert!(h.coordinator.mark_followup_viewed(ids[1]).await.unwrap());
    assert!(!h.coordinator.mark_followup_viewed(ids[1] + 100).await.unwrap());
    assert_eq!(h.coordinator.unviewed_followups().await.unwrap(), 1);

    // Viewing does not resolve.
    assert_eq!(h.coordinator.followups(true).await.unwrap().len(), 2);
}

#[tokio::test]
async fn sms_conversations_get_notices_over_the_channel() {
    let h = harness();
    let visitor = "+15550001111";
    let outcome = h.coordinator.handle_inbound("sms", visitor, "hi").await.unwrap();
    assert!(outcome.reply().is_some(), "sms greeting is returned inline");

    h.coordinator
        .scheduler()
        .tick_at(Utc::now() + Duration::seconds(31))
        .await
        .unwrap();
    h.coordinator
        .handle_staff_reply(visitor, "sms", "We're on it", None)
        .await
        .unwrap();
    h.coordinator.settle_deliveries().await;

    let sent = h.sms.sent_to(visitor).await;
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().any(|text| text == "We're on it"));
}

#[tokio::test]
async fn failed_channel_send_does_not_fail_the_operation() {
    let h = harness();
    h.sms.set_failing(true);
    h.coordinator.handle_inbound("sms", "+15550001111", "hi").await.unwrap();
    let message = h
        .coordinator
        .handle_staff_reply("+15550001111", "sms", "hello", None)
        .await
        .unwrap();
    h.coordinator.settle_deliveries().await;
    assert_eq!(message.text, "hello");
    assert!(h.sms.sent().await.is_empty());
}

#[tokio::test]
async fn admin_connect_replays_open_conversations() {
    let h = harness();
    h.coordinator.handle_inbound("webchat", "alice", "hello").await.unwrap();
    h.coordinator.handle_inbound("sms", "+15550001111", "hi").await.unwrap();
    h.coordinator.handle_inbound("webchat", "carol", "bye").await.unwrap();
    h.coordinator.handle_close("carol", "webchat").await.unwrap();

    let (tx, mut rx) = mpsc::channel(16);
    let id = h.coordinator.register_admin_socket(dana(), tx).await.unwrap();
    let snapshot = frame(rx.recv().await.unwrap());
    assert_eq!(snapshot["type"], "snapshot");
    let conversations = snapshot["conversations"].as_array().unwrap();
    assert_eq!(conversations.len(), 2);
    assert!(conversations.iter().all(|c| c["messages"].as_array().unwrap().len() == 1));

    h.coordinator.unregister_admin_socket(id);
    assert_eq!(h.coordinator.hub().admin_count(), 0);
}

#[tokio::test]
async fn admin_connect_fails_cleanly_when_store_is_down() {
    let h = harness();
    h.store.set_unavailable(true);
    let (tx, _rx) = mpsc::channel(16);
    let result = h.coordinator.register_admin_socket(dana(), tx).await;
    assert!(matches!(result, Err(HandoffError::StorageUnavailable { .. })));
    assert_eq!(h.coordinator.hub().admin_count(), 0);
}

#[tokio::test]
async fn typing_is_relayed_between_domains() {
    let h = harness();
    h.coordinator.handle_inbound("webchat", "alice", "hello").await.unwrap();
    let (user_tx, mut user_rx) = mpsc::channel(16);
    let (admin_tx, mut admin_rx) = mpsc::channel(16);
    h.coordinator.register_user_socket("alice", "webchat", user_tx);
    h.coordinator.register_admin_socket(dana(), admin_tx).await.unwrap();
    admin_rx.recv().await.unwrap();

    let delivery = h
        .coordinator
        .relay_typing("alice", "webchat", SenderRole::User, true);
    assert_eq!(delivery.delivered, 1);
    assert_eq!(frame(admin_rx.recv().await.unwrap())["type"], "typing_start");
    assert!(user_rx.try_recv().is_err());

    h.coordinator
        .relay_typing("alice", "webchat", SenderRole::Staff, false);
    assert_eq!(frame(user_rx.recv().await.unwrap())["type"], "typing_stop");
}

#[tokio::test]
async fn unknown_conversations_are_not_found() {
    let h = harness();
    assert!(matches!(
        h.coordinator.transcript("ghost", "webchat").await,
        Err(HandoffError::NotFound { .. })
    ));
    assert!(matches!(
        h.coordinator.handle_followup("ghost", "webchat", None, "call me").await,
        Err(HandoffError::NotFound { .. })
    ));
    assert!(matches!(
        h.coordinator.handle_assign("ghost", "webchat", &dana()).await,
        Err(HandoffError::NotFound { .. })
    ));
}

#[tokio::test]
async fn dead_user_socket_is_pruned_on_push() {
    let h = harness();
    let (tx, rx) = mpsc::channel(16);
    h.coordinator.register_user_socket("alice", "webchat", tx);
    drop(rx);

    h.coordinator.handle_inbound("webchat", "alice", "hello").await.unwrap();
    assert_eq!(h.coordinator.hub().user_socket_count(&alice()), 0);
}

#[tokio::test(start_paused = true)]
async fn escalation_driver_stops_on_cancel() {
    let h = harness();
    let coordinator = Arc::new(h.coordinator);
    let cancel = tokio_util::sync::CancellationToken::new();
    let driver = tokio::spawn(
        coordinator
            .clone()
            .run_escalation(std::time::Duration::from_secs(30), cancel.clone()),
    );

    // Several ticks over an empty store are harmless.
    tokio::time::sleep(std::time::Duration::from_secs(95)).await;
    assert!(!driver.is_finished());

    cancel.cancel();
    driver.await.unwrap();
}
