// SPDX-FileCopyrightText: 2026 Handoff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions for the external collaborators.
//!
//! All adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod auth;
pub mod channel;
pub mod storage;

pub use adapter::PluginAdapter;
pub use auth::AuthAdapter;
pub use channel::ChannelAdapter;
pub use storage::ConversationStore;
