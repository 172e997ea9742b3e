// SPDX-FileCopyrightText: 2026 Handoff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sliding-window inbound rate limiting per conversation.

use std::collections::VecDeque;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;

use handoff_config::model::RateLimitConfig;
use handoff_core::ConversationKey;

/// Admits at most `max_messages` inbound messages per conversation within any
/// trailing `window`.
///
/// Rejected attempts are not recorded, so a visitor who keeps sending while
/// throttled is admitted again as soon as the oldest accepted message ages
/// out of the window.
#[derive(Debug)]
pub struct RateLimiter {
    max_messages: usize,
    window: Duration,
    history: DashMap<ConversationKey, VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_messages: usize, window: Duration) -> Self {
        Self {
            max_messages,
            window,
            history: DashMap::new(),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_messages, Duration::from_secs(config.window_secs))
    }

    /// Check and record one attempt at the current time.
    pub fn check(&self, key: &ConversationKey) -> bool {
        self.check_at(key, Instant::now())
    }

    /// Check and record one attempt as if it arrived at `now`.
    pub fn check_at(&self, key: &ConversationKey, now: Instant) -> bool {
        let mut entry = self.history.entry(key.clone()).or_default();
        let recent = entry.value_mut();
        while let Some(&oldest) = recent.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                recent.pop_front();
            } else {
                break;
            }
        }

        if recent.len() >= self.max_messages {
            debug!(%key, recent = recent.len(), "inbound message rate limited");
            return false;
        }
        recent.push_back(now);
        true
    }

    /// Drop keys whose whole history has aged out of the window.
    pub fn prune_idle(&self) -> usize {
        let now = Instant::now();
        let before = self.history.len();
        self.history.retain(|_, recent| {
            recent
                .back()
                .is_some_and(|&last| now.saturating_duration_since(last) < self.window)
        });
        before - self.history.len()
    }

    pub fn tracked_keys(&self) -> usize {
        self.history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> ConversationKey {
        ConversationKey::new("alice", "webchat")
    }

    #[tokio::test(start_paused = true)]
    async fn seventh_message_in_window_is_rejected() {
        let limiter = RateLimiter::new(6, Duration::from_secs(10));
        let admitted = (0..7).filter(|_| limiter.check(&alice())).count();
        assert_eq!(admitted, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn window_slides_after_oldest_ages_out() {
        let limiter = RateLimiter::new(6, Duration::from_secs(10));
        for _ in 0..6 {
            assert!(limiter.check(&alice()));
            tokio::time::advance(Duration::from_secs(1)).await;
        }
        // Six seconds in: the first message is still inside the window.
        assert!(!limiter.check(&alice()));

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(limiter.check(&alice()));
        assert!(!limiter.check(&alice()));
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_attempts_do_not_extend_the_block() {
        let limiter = RateLimiter::new(2, Duration::from_secs(10));
        assert!(limiter.check(&alice()));
        assert!(limiter.check(&alice()));
        for _ in 0..5 {
            tokio::time::advance(Duration::from_secs(1)).await;
            assert!(!limiter.check(&alice()));
        }
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(limiter.check(&alice()));
    }

    #[tokio::test(start_paused = true)]
    async fn conversations_are_limited_independently() {
        let limiter = RateLimiter::new(1, Duration::from_secs(10));
        let bob = ConversationKey::new("bob", "webchat");
        let alice_sms = ConversationKey::new("alice", "sms");
        assert!(limiter.check(&alice()));
        assert!(!limiter.check(&alice()));
        assert!(limiter.check(&bob));
        assert!(limiter.check(&alice_sms));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_keys_are_pruned() {
        let limiter = RateLimiter::new(6, Duration::from_secs(10));
        limiter.check(&alice());
        limiter.check(&ConversationKey::new("bob", "sms"));
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(limiter.prune_idle(), 0);

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(limiter.prune_idle(), 2);
        assert_eq!(limiter.tracked_keys(), 0);
    }
}
