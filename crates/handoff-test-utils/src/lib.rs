// SPDX-FileCopyrightText: 2026 Handoff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Handoff integration tests.
//!
//! Provides in-memory adapters for fast, deterministic tests without SQLite
//! or Twilio.
//!
//! # Components
//!
//! - [`MemoryStore`] - `ConversationStore` over a `HashMap`, with failure injection
//! - [`MockChannel`] - `ChannelAdapter` that captures sends

pub mod memory_store;
pub mod mock_channel;

pub use memory_store::MemoryStore;
pub use mock_channel::{MockChannel, SentText};
