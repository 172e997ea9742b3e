// SPDX-FileCopyrightText: 2026 Handoff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outward channel adapters keyed by channel kind.
//!
//! Sends run as detached tasks so that a slow provider never holds up the
//! request or scheduler tick that triggered them. Failures are logged and
//! dropped.

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use handoff_core::{ChannelAdapter, ChannelKind, PluginAdapter};

/// One adapter per outward channel kind.
#[derive(Default)]
pub struct ChannelRegistry {
    adapters: HashMap<ChannelKind, Arc<dyn ChannelAdapter>>,
    in_flight: TaskTracker,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own kind, replacing any previous one.
    pub fn register(&mut self, adapter: Arc<dyn ChannelAdapter>) {
        debug!(kind = %adapter.kind(), adapter = adapter.name(), "channel adapter registered");
        self.adapters.insert(adapter.kind(), adapter);
    }

    pub fn with(mut self, adapter: Arc<dyn ChannelAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn get(&self, kind: ChannelKind) -> Option<Arc<dyn ChannelAdapter>> {
        self.adapters.get(&kind).cloned()
    }

    pub fn kinds(&self) -> Vec<ChannelKind> {
        self.adapters.keys().copied().collect()
    }

    /// Queue a send. Returns `false` when no adapter serves `kind`.
    pub fn dispatch(&self, kind: ChannelKind, destination: &str, text: &str) -> bool {
        let Some(adapter) = self.get(kind) else {
            warn!(%kind, destination, "no channel adapter registered, message not delivered");
            return false;
        };
        let destination = destination.to_string();
        let text = text.to_string();
        self.in_flight.spawn(async move {
            match adapter.send_text(&destination, &text).await {
                Ok(id) => debug!(%kind, %destination, message_id = %id.0, "outbound message sent"),
                Err(e) => warn!(%kind, %destination, error = %e, "outbound delivery failed"),
            }
        });
        true
    }

    /// Wait until every queued send has finished.
    pub async fn settle(&self) {
        self.in_flight.close();
        self.in_flight.wait().await;
        self.in_flight.reopen();
    }
}
