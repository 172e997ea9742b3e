// SPDX-FileCopyrightText: 2026 Handoff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Service shutdown: turn SIGINT/SIGTERM into a [`CancellationToken`], then
//! give queued SMS and WhatsApp sends a bounded window to reach the provider.

use std::fmt;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use handoff_coordinator::Coordinator;

/// How long outbound sends may keep running once the service is stopping.
pub const DELIVERY_GRACE: Duration = Duration::from_secs(10);

/// Which signal stopped the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    Interrupt,
    Terminate,
}

impl fmt::Display for StopSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopSignal::Interrupt => f.write_str("SIGINT"),
            StopSignal::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// Resolve once SIGINT or (on unix) SIGTERM arrives.
pub async fn wait_for_signal() -> StopSignal {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => return StopSignal::Interrupt,
                    _ = sigterm.recv() => return StopSignal::Terminate,
                }
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable, only Ctrl+C stops the service");
            }
        }
    }
    let _ = tokio::signal::ctrl_c().await;
    StopSignal::Interrupt
}

/// Cancel the returned token when the process is asked to stop.
pub fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        let received = wait_for_signal().await;
        info!(signal = %received, "stopping handoff service");
        trigger.cancel();
    });
    token
}

/// Wait up to `grace` for in-flight channel sends.
///
/// Returns `false` when sends were still pending at the deadline; those
/// messages stay recorded in the transcript but may never reach the visitor.
pub async fn drain_deliveries(coordinator: &Coordinator, grace: Duration) -> bool {
    match tokio::time::timeout(grace, coordinator.settle_deliveries()).await {
        Ok(()) => true,
        Err(_) => {
            warn!(
                grace_secs = grace.as_secs(),
                "outbound sends still pending at shutdown, abandoning them"
            );
            false
        }
    }
}
