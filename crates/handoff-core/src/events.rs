// SPDX-FileCopyrightText: 2026 Handoff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Real-time events pushed to live subscriber connections.
//!
//! Serialized as internally tagged JSON:
//! ```json
//! {"type": "user_message", "text": "hi", "ts": "2026-01-01T00:00:00Z"}
//! {"type": "typing_start", "sender": "staff"}
//! {"type": "ping"}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Conversation, Message, SenderRole};

/// One conversation's state and transcript, as replayed to a new admin socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSnapshot {
    pub conversation: Conversation,
    pub messages: Vec<Message>,
}

/// A state change or control event consumed by both fan-out domains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HubEvent {
    UserMessage {
        text: String,
        ts: DateTime<Utc>,
    },
    StaffMessage {
        text: String,
        ts: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        staff: Option<String>,
    },
    SystemMessage {
        text: String,
        ts: DateTime<Utc>,
    },
    TypingStart {
        sender: SenderRole,
    },
    TypingStop {
        sender: SenderRole,
    },
    Snapshot {
        conversations: Vec<ConversationSnapshot>,
    },
    Ping,
}

impl HubEvent {
    /// Build the event announcing a persisted message.
    pub fn from_message(message: &Message) -> Self {
        let text = message.text.clone();
        let ts = message.created_at;
        match message.sender {
            SenderRole::User => HubEvent::UserMessage { text, ts },
            SenderRole::Staff => HubEvent::StaffMessage {
                text,
                ts,
                staff: None,
            },
            SenderRole::System => HubEvent::SystemMessage { text, ts },
        }
    }

    /// Events produced by the visitor's own client.
    ///
    /// The visitor already has these locally, so they are never echoed back
    /// to that conversation's end-user sockets.
    pub fn is_user_originated(&self) -> bool {
        matches!(
            self,
            HubEvent::UserMessage { .. }
                | HubEvent::TypingStart {
                    sender: SenderRole::User
                }
                | HubEvent::TypingStop {
                    sender: SenderRole::User
                }
        )
    }

    /// Serialize to the JSON text frame sent over a socket.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to serialize hub event");
            r#"{"type":"ping"}"#.to_string()
        })
    }
}
