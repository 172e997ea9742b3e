// SPDX-FileCopyrightText: 2026 Handoff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Registry of live subscriber connections and best-effort event delivery.
//!
//! Each socket is represented by the sending half of a bounded channel whose
//! receiver is drained by the socket's writer task. Delivery uses `try_send`:
//! a full or closed channel counts as a failed send and the socket is removed
//! from its registry immediately. Dropping the last sender closes the writer,
//! which tears the connection down.
//!
//! Broadcasts never hold a registry lock while sending: targets are cloned out
//! first, then failures are reconciled afterwards.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use handoff_core::{ConversationKey, HubEvent, StaffIdentity};

/// Process-unique id of one registered socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketId(u64);

impl std::fmt::Display for SocketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "socket-{}", self.0)
    }
}

/// Outbound frame queue of one socket.
pub type FrameSender = mpsc::Sender<String>;

#[derive(Clone)]
struct UserSubscriber {
    id: SocketId,
    tx: FrameSender,
}

#[derive(Clone)]
struct AdminSubscriber {
    identity: StaffIdentity,
    tx: FrameSender,
}

/// Admin frames carry the conversation they concern next to the event fields.
#[derive(Serialize)]
struct AdminEnvelope<'a> {
    user_id: &'a str,
    channel: &'a str,
    #[serde(flatten)]
    event: &'a HubEvent,
}

/// Outcome of one delivery attempt across a set of sockets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub pruned: usize,
}

impl std::ops::AddAssign for Delivery {
    fn add_assign(&mut self, other: Self) {
        self.delivered += other.delivered;
        self.pruned += other.pruned;
    }
}

/// Two broadcast domains: end-user sockets per conversation, and admin sockets.
#[derive(Default)]
pub struct FanoutHub {
    conversations: DashMap<ConversationKey, Vec<UserSubscriber>>,
    admins: DashMap<SocketId, AdminSubscriber>,
    next_id: AtomicU64,
}

impl FanoutHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&self) -> SocketId {
        SocketId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Bind an end-user socket to a conversation. Several sockets may share one key.
    pub fn register_user(&self, key: &ConversationKey, tx: FrameSender) -> SocketId {
        let id = self.allocate_id();
        self.conversations
            .entry(key.clone())
            .or_default()
            .push(UserSubscriber { id, tx });
        debug!(%key, socket = %id, "user socket registered");
        id
    }

    pub fn unregister_user(&self, key: &ConversationKey, id: SocketId) {
        self.remove_user_sockets(key, &[id]);
        debug!(%key, socket = %id, "user socket unregistered");
    }

    /// Add an admin socket carrying its authenticated identity.
    pub fn register_admin(&self, identity: StaffIdentity, tx: FrameSender) -> SocketId {
        let id = self.allocate_id();
        debug!(socket = %id, staff = %identity.name, "admin socket registered");
        self.admins.insert(id, AdminSubscriber { identity, tx });
        id
    }

    pub fn unregister_admin(&self, id: SocketId) {
        if self.admins.remove(&id).is_some() {
            debug!(socket = %id, "admin socket unregistered");
        }
    }

    /// Deliver to every end-user socket of one conversation. Admins are not included.
    pub fn push(&self, key: &ConversationKey, event: &HubEvent) -> Delivery {
        let targets = match self.conversations.get(key) {
            Some(subscribers) => subscribers.clone(),
            None => return Delivery::default(),
        };
        let frame = event.to_json();

        let failed: Vec<SocketId> = targets
            .iter()
            .filter_map(|s| match s.tx.try_send(frame.clone()) {
                Ok(()) => None,
                Err(e) => {
                    warn!(%key, socket = %s.id, error = %e, "user socket delivery failed, pruning");
                    Some(s.id)
                }
            })
            .collect();

        if !failed.is_empty() {
            self.remove_user_sockets(key, &failed);
        }
        Delivery {
            delivered: targets.len() - failed.len(),
            pruned: failed.len(),
        }
    }

    /// Deliver to every admin socket, tagged with the conversation it concerns.
    pub fn broadcast_admins(&self, key: &ConversationKey, event: &HubEvent) -> Delivery {
        let envelope = AdminEnvelope {
            user_id: &key.user_id,
            channel: &key.channel,
            event,
        };
        let frame = match serde_json::to_string(&envelope) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(%key, error = %e, "failed to serialize admin frame");
                return Delivery::default();
            }
        };

        let targets: Vec<(SocketId, FrameSender)> = self
            .admins
            .iter()
            .map(|entry| (*entry.key(), entry.value().tx.clone()))
            .collect();

        let mut delivery = Delivery::default();
        for (id, tx) in targets {
            match tx.try_send(frame.clone()) {
                Ok(()) => delivery.delivered += 1,
                Err(e) => {
                    warn!(socket = %id, error = %e, "admin socket delivery failed, pruning");
                    self.admins.remove(&id);
                    delivery.pruned += 1;
                }
            }
        }
        delivery
    }

    /// Deliver a state change to both domains.
    ///
    /// Visitor-originated events skip the visitor's own sockets, which
    /// already display them; admins always receive every event.
    pub fn publish(&self, key: &ConversationKey, event: &HubEvent) -> Delivery {
        let mut delivery = Delivery::default();
        if !event.is_user_originated() {
            delivery += self.push(key, event);
        }
        delivery += self.broadcast_admins(key, event);
        delivery
    }

    /// Send an untagged event to one admin socket (used for snapshot replay).
    pub fn send_to_admin(&self, id: SocketId, event: &HubEvent) -> bool {
        let Some(tx) = self.admins.get(&id).map(|a| a.tx.clone()) else {
            return false;
        };
        match tx.try_send(event.to_json()) {
            Ok(()) => true,
            Err(e) => {
                warn!(socket = %id, error = %e, "admin socket delivery failed, pruning");
                self.admins.remove(&id);
                false
            }
        }
    }

    pub fn user_socket_count(&self, key: &ConversationKey) -> usize {
        self.conversations.get(key).map_or(0, |s| s.len())
    }

    pub fn admin_count(&self) -> usize {
        self.admins.len()
    }

    /// Identities of connected admins.
    pub fn connected_staff(&self) -> Vec<StaffIdentity> {
        self.admins
            .iter()
            .map(|entry| entry.value().identity.clone())
            .collect()
    }

    fn remove_user_sockets(&self, key: &ConversationKey, ids: &[SocketId]) {
        if let Some(mut subscribers) = self.conversations.get_mut(key) {
            subscribers.retain(|s| !ids.contains(&s.id));
        }
        self.conversations
            .remove_if(key, |_, subscribers| subscribers.is_empty());
    }
}
