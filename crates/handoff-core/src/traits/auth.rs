// SPDX-FileCopyrightText: 2026 Handoff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Authentication adapter trait for dashboard identities.

use async_trait::async_trait;

use crate::error::HandoffError;
use crate::traits::adapter::PluginAdapter;
use crate::types::StaffIdentity;

/// Resolves a credential to a verified staff identity.
///
/// The coordination core trusts the returned identity and never revalidates
/// credentials itself.
#[async_trait]
pub trait AuthAdapter: PluginAdapter {
    /// Authenticates the given token and returns the verified identity.
    async fn authenticate(&self, token: &str) -> Result<StaffIdentity, HandoffError>;
}
