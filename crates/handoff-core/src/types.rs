// SPDX-FileCopyrightText: 2026 Handoff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across adapter traits and the coordination core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Identifier returned by a channel adapter for a delivered message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the type of adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Channel,
    Storage,
    Auth,
}

/// The unit of handoff state: one user identity on one channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationKey {
    pub user_id: String,
    pub channel: String,
}

impl ConversationKey {
    pub fn new(user_id: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            channel: channel.into(),
        }
    }

    /// The channel kind, if the channel name is one we know how to reach.
    pub fn kind(&self) -> Option<ChannelKind> {
        ChannelKind::from_channel(&self.channel)
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}|{}", self.user_id, self.channel)
    }
}

/// Messaging surfaces a conversation can arrive on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Webchat,
    Sms,
    Whatsapp,
    Messenger,
}

impl ChannelKind {
    /// Parse a conversation's channel name into a kind.
    pub fn from_channel(channel: &str) -> Option<Self> {
        channel.to_ascii_lowercase().parse().ok()
    }

    /// Whether text can be pushed to this channel through a channel adapter.
    ///
    /// Webchat delivery is a fan-out push, never an adapter call.
    pub fn is_outward(self) -> bool {
        !matches!(self, ChannelKind::Webchat)
    }
}

/// Step a stalled, unassigned conversation has reached in the
/// "ask for patience, then ask for offline contact" sequence.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EscalationStage {
    #[default]
    None,
    PatienceSent,
    FinalSent,
    /// Staff has engaged; no further auto-escalation until close and reopen.
    Terminated,
}

impl EscalationStage {
    /// The next automatic stage. Stages are strictly sequential.
    pub fn next(self) -> Option<Self> {
        match self {
            EscalationStage::None => Some(EscalationStage::PatienceSent),
            EscalationStage::PatienceSent => Some(EscalationStage::FinalSent),
            EscalationStage::FinalSent | EscalationStage::Terminated => None,
        }
    }
}

/// Derived lifecycle state of a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    OpenUnassigned,
    OpenAssigned,
    OpenEscalating,
    Closed,
}

/// Who wrote a message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SenderRole {
    User,
    Staff,
    System,
}

/// A conversation record as persisted by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub user_id: String,
    pub channel: String,
    pub open: bool,
    pub assigned_staff: Option<String>,
    pub escalation_stage: EscalationStage,
    pub created_at: DateTime<Utc>,
    /// Last activity of any kind from the user or staff.
    pub updated_at: DateTime<Utc>,
    pub escalated_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    /// Staff member assigned when the conversation last closed.
    pub handled_by: Option<String>,
}

impl Conversation {
    /// A freshly opened, unassigned conversation.
    pub fn new(key: &ConversationKey, at: DateTime<Utc>) -> Self {
        Self {
            user_id: key.user_id.clone(),
            channel: key.channel.clone(),
            open: true,
            assigned_staff: None,
            escalation_stage: EscalationStage::None,
            created_at: at,
            updated_at: at,
            escalated_at: None,
            closed_at: None,
            handled_by: None,
        }
    }

    pub fn key(&self) -> ConversationKey {
        ConversationKey::new(&self.user_id, &self.channel)
    }

    pub fn state(&self) -> ConversationState {
        if !self.open {
            ConversationState::Closed
        } else if self.assigned_staff.is_some() {
            ConversationState::OpenAssigned
        } else if matches!(
            self.escalation_stage,
            EscalationStage::PatienceSent | EscalationStage::FinalSent
        ) {
            ConversationState::OpenEscalating
        } else {
            ConversationState::OpenUnassigned
        }
    }

    /// Apply an update in memory, honoring its guards.
    ///
    /// Returns `false` (leaving `self` untouched) when a guard does not match.
    /// Stores without native compare-and-set use this to share one definition
    /// of the update semantics.
    pub fn apply(&mut self, update: &ConversationUpdate) -> bool {
        if let Some(expected) = update.expect_stage
            && self.escalation_stage != expected
        {
            return false;
        }
        if let Some(expected) = update.expect_open
            && self.open != expected
        {
            return false;
        }
        if let Some(open) = update.open {
            self.open = open;
        }
        if let Some(ref staff) = update.assigned_staff {
            self.assigned_staff = staff.clone();
        }
        if let Some(stage) = update.escalation_stage {
            self.escalation_stage = stage;
        }
        if let Some(escalated_at) = update.escalated_at {
            self.escalated_at = escalated_at;
        }
        if let Some(updated_at) = update.updated_at {
            self.updated_at = updated_at;
        }
        if let Some(closed_at) = update.closed_at {
            self.closed_at = closed_at;
        }
        if let Some(ref handled_by) = update.handled_by {
            self.handled_by = handled_by.clone();
        }
        true
    }
}

/// A guarded partial update of a conversation record.
///
/// `expect_*` fields are compare-and-set guards: the write is applied only when
/// every guard matches the stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationUpdate {
    pub expect_stage: Option<EscalationStage>,
    pub expect_open: Option<bool>,
    pub open: Option<bool>,
    pub assigned_staff: Option<Option<String>>,
    pub escalation_stage: Option<EscalationStage>,
    pub escalated_at: Option<Option<DateTime<Utc>>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub closed_at: Option<Option<DateTime<Utc>>>,
    pub handled_by: Option<Option<String>>,
}

impl ConversationUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect_stage(mut self, stage: EscalationStage) -> Self {
        self.expect_stage = Some(stage);
        self
    }

    pub fn expect_open(mut self, open: bool) -> Self {
        self.expect_open = Some(open);
        self
    }

    pub fn open(mut self, open: bool) -> Self {
        self.open = Some(open);
        self
    }

    pub fn assigned_staff(mut self, staff: Option<String>) -> Self {
        self.assigned_staff = Some(staff);
        self
    }

    pub fn stage(mut self, stage: EscalationStage) -> Self {
        self.escalation_stage = Some(stage);
        self
    }

    pub fn escalated_at(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.escalated_at = Some(at);
        self
    }

    pub fn touched(mut self, at: DateTime<Utc>) -> Self {
        self.updated_at = Some(at);
        self
    }

    pub fn closed_at(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.closed_at = Some(at);
        self
    }

    pub fn handled_by(mut self, staff: Option<String>) -> Self {
        self.handled_by = Some(staff);
        self
    }

    /// Close an open conversation at `at`, recording who had it.
    pub fn closing(handled_by: Option<String>, at: DateTime<Utc>) -> Self {
        Self::new()
            .expect_open(true)
            .open(false)
            .assigned_staff(None)
            .handled_by(handled_by)
            .closed_at(Some(at))
            .touched(at)
    }
}

/// A guarded escalation step plus the system notice it produces.
///
/// Stores apply the stage change and the notice append as one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct StageTransition {
    pub from: EscalationStage,
    pub to: EscalationStage,
    /// `updated_at` of the record the idle time was measured against. Any
    /// newer activity voids the transition.
    pub observed_updated_at: DateTime<Utc>,
    pub at: DateTime<Utc>,
    pub notice: Message,
}

impl StageTransition {
    /// Step `conversation` from its current stage to `to`, guarded on the
    /// activity clock it was read with.
    pub fn from_observed(conversation: &Conversation, to: EscalationStage, notice: Message) -> Self {
        Self {
            from: conversation.escalation_stage,
            to,
            observed_updated_at: conversation.updated_at,
            at: notice.created_at,
            notice,
        }
    }

    /// Whether `conversation` is still in the state this transition was planned from.
    pub fn still_applies(&self, conversation: &Conversation) -> bool {
        conversation.open
            && conversation.assigned_staff.is_none()
            && conversation.escalation_stage == self.from
            && conversation.updated_at == self.observed_updated_at
    }
}

/// One entry in a conversation's append-only log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub user_id: String,
    pub channel: String,
    pub sender: SenderRole,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(
        key: &ConversationKey,
        sender: SenderRole,
        text: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: key.user_id.clone(),
            channel: key.channel.clone(),
            sender,
            text: text.into(),
            created_at: at,
        }
    }
}

/// Offline contact details left by a visitor after full escalation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFollowup {
    pub user_id: String,
    pub channel: String,
    pub contact: Option<String>,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// A persisted follow-up record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Followup {
    pub id: i64,
    pub user_id: String,
    pub channel: String,
    pub contact: Option<String>,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub resolved: bool,
    /// Opened by someone on the dashboard.
    pub viewed: bool,
}

/// A closed conversation as listed in the dashboard history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedConversation {
    pub user_id: String,
    pub channel: String,
    pub handled_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub message_count: u64,
}

/// Role granted to an authenticated dashboard user.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum StaffRole {
    Admin,
    Staff,
}

/// A verified identity supplied by the auth collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffIdentity {
    pub name: String,
    pub role: StaffRole,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_conversation() -> Conversation {
        Conversation::new(&ConversationKey::new("alice", "webchat"), Utc::now())
    }

    #[test]
    fn stages_advance_strictly_in_order() {
        assert_eq!(EscalationStage::None.next(), Some(EscalationStage::PatienceSent));
        assert_eq!(
            EscalationStage::PatienceSent.next(),
            Some(EscalationStage::FinalSent)
        );
        assert_eq!(EscalationStage::FinalSent.next(), None);
        assert_eq!(EscalationStage::Terminated.next(), None);
    }

    #[test]
    fn stage_names_are_snake_case() {
        assert_eq!(EscalationStage::PatienceSent.to_string(), "patience_sent");
        assert_eq!(
            "final_sent".parse::<EscalationStage>().unwrap(),
            EscalationStage::FinalSent
        );
    }

    #[test]
    fn channel_kind_parsing_is_case_insensitive() {
        assert_eq!(ChannelKind::from_channel("WhatsApp"), Some(ChannelKind::Whatsapp));
        assert_eq!(ChannelKind::from_channel("sms"), Some(ChannelKind::Sms));
        assert_eq!(ChannelKind::from_channel("carrier-pigeon"), None);
        assert!(!ChannelKind::Webchat.is_outward());
        assert!(ChannelKind::Sms.is_outward());
    }

    #[test]
    fn state_is_derived_from_fields() {
        let mut convo = open_conversation();
        assert_eq!(convo.state(), ConversationState::OpenUnassigned);

        convo.escalation_stage = EscalationStage::PatienceSent;
        assert_eq!(convo.state(), ConversationState::OpenEscalating);

        convo.assigned_staff = Some("bob".into());
        assert_eq!(convo.state(), ConversationState::OpenAssigned);

        convo.open = false;
        assert_eq!(convo.state(), ConversationState::Closed);
    }

    #[test]
    fn terminated_unassigned_is_plain_open() {
        let mut convo = open_conversation();
        convo.escalation_stage = EscalationStage::Terminated;
        assert_eq!(convo.state(), ConversationState::OpenUnassigned);
    }

    #[test]
    fn apply_rejects_mismatched_stage_guard() {
        let mut convo = open_conversation();
        convo.escalation_stage = EscalationStage::Terminated;
        let before = convo.clone();

        let applied = convo.apply(
            &ConversationUpdate::new()
                .expect_stage(EscalationStage::None)
                .stage(EscalationStage::PatienceSent),
        );

        assert!(!applied);
        assert_eq!(convo, before);
    }

    #[test]
    fn apply_sets_only_named_fields() {
        let mut convo = open_conversation();
        convo.assigned_staff = Some("bob".into());

        let applied = convo.apply(&ConversationUpdate::new().expect_open(true).open(false));

        assert!(applied);
        assert!(!convo.open);
        assert_eq!(convo.assigned_staff.as_deref(), Some("bob"));
    }

    #[test]
    fn closing_records_assignee_and_time() {
        let mut convo = open_conversation();
        convo.assigned_staff = Some("bob".into());
        let at = convo.updated_at + chrono::Duration::seconds(30);

        assert!(convo.apply(&ConversationUpdate::closing(convo.assigned_staff.clone(), at)));
        assert!(!convo.open);
        assert!(convo.assigned_staff.is_none());
        assert_eq!(convo.handled_by.as_deref(), Some("bob"));
        assert_eq!(convo.closed_at, Some(at));
        assert_eq!(convo.updated_at, at);

        // A second close loses the open guard.
        assert!(!convo.apply(&ConversationUpdate::closing(None, at)));
        assert_eq!(convo.handled_by.as_deref(), Some("bob"));
    }

    #[test]
    fn transition_is_void_after_newer_activity() {
        let mut convo = open_conversation();
        let key = convo.key();
        let notice = Message::new(&key, SenderRole::System, "hang on", convo.updated_at);
        let transition = StageTransition::from_observed(&convo, EscalationStage::PatienceSent, notice);
        assert!(transition.still_applies(&convo));

        convo.updated_at += chrono::Duration::seconds(1);
        assert!(!transition.still_applies(&convo));
    }

    #[test]
    fn key_display_joins_user_and_channel() {
        let key = ConversationKey::new("alice", "webchat");
        assert_eq!(key.to_string(), "alice|webchat");
        assert_eq!(key.kind(), Some(ChannelKind::Webchat));
    }
}
