// SPDX-FileCopyrightText: 2026 Handoff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock channel adapter for deterministic testing.
//!
//! `MockChannel` implements `ChannelAdapter` by capturing every
//! `send_text` call for later assertion. It can be switched into a failing
//! mode to exercise delivery-failure paths, or given a latency to exercise
//! slow providers.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use handoff_core::{
    AdapterType, ChannelAdapter, ChannelKind, HandoffError, HealthStatus, MessageId,
    PluginAdapter,
};

/// One captured outbound send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentText {
    pub destination: String,
    pub text: String,
}

/// A mock outward channel.
pub struct MockChannel {
    kind: ChannelKind,
    sent: Mutex<Vec<SentText>>,
    failing: AtomicBool,
    latency_ms: AtomicU64,
}

impl MockChannel {
    pub fn new(kind: ChannelKind) -> Self {
        Self {
            kind,
            sent: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            latency_ms: AtomicU64::new(0),
        }
    }

    /// Make subsequent sends fail with `DeliveryFailed`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Hold every subsequent send for `latency` before it completes.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// All sends captured so far.
    pub async fn sent(&self) -> Vec<SentText> {
        self.sent.lock().await.clone()
    }

    /// Sends addressed to one destination.
    pub async fn sent_to(&self, destination: &str) -> Vec<String> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|s| s.destination == destination)
            .map(|s| s.text.clone())
            .collect()
    }

    pub async fn clear(&self) {
        self.sent.lock().await.clear();
    }
}

#[async_trait]
impl PluginAdapter for MockChannel {
    fn name(&self) -> &str {
        "mock-channel"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }

    async fn health_check(&self) -> Result<HealthStatus, HandoffError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), HandoffError> {
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for MockChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn send_text(&self, destination: &str, text: &str) -> Result<MessageId, HandoffError> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(HandoffError::DeliveryFailed {
                message: format!("mock {} send to {destination} failed", self.kind),
                source: None,
            });
        }
        self.sent.lock().await.push(SentText {
            destination: destination.to_string(),
            text: text.to_string(),
        });
        Ok(MessageId(format!("mock-msg-{}", uuid::Uuid::new_v4())))
    }
}
