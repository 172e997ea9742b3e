// SPDX-FileCopyrightText: 2026 Handoff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Handoff coordination service.
//!
//! This crate provides the domain model (conversations, messages, follow-ups,
//! escalation stages), the error taxonomy, the real-time event type, and the
//! adapter traits that storage, channel, and auth collaborators implement.

pub mod error;
pub mod events;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::HandoffError;
pub use events::HubEvent;
pub use types::{
    AdapterType, ChannelKind, ClosedConversation, Conversation, ConversationKey, ConversationState,
    ConversationUpdate, EscalationStage, Followup, HealthStatus, Message, MessageId,
    NewFollowup, SenderRole, StaffIdentity, StaffRole, StageTransition,
};

// Re-export all adapter traits at crate root.
pub use traits::{AuthAdapter, ChannelAdapter, ConversationStore, PluginAdapter};
