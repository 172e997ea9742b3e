// SPDX-FileCopyrightText: 2026 Handoff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `handoff serve`: wire storage, channels, the coordinator, and the gateway.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use handoff_config::HandoffConfig;
use handoff_coordinator::{ChannelRegistry, Coordinator};
use handoff_core::{ChannelKind, ConversationStore, HandoffError, HealthStatus, PluginAdapter};
use handoff_gateway::{start_server, GatewayState, SocketSettings, StaticTokenAuth};
use handoff_storage::SqliteStore;
use handoff_twilio::TwilioChannel;

use crate::shutdown::{drain_deliveries, install_signal_handler, DELIVERY_GRACE};

/// Register Twilio-backed channels for every kind that has a sender number.
pub fn build_channels(config: &HandoffConfig) -> ChannelRegistry {
    let mut registry = ChannelRegistry::new();
    if !config.twilio.is_configured() {
        info!("twilio not configured, outbound SMS and WhatsApp disabled");
        return registry;
    }
    for kind in [ChannelKind::Sms, ChannelKind::Whatsapp] {
        match TwilioChannel::new(kind, &config.twilio) {
            Ok(channel) => {
                info!(%kind, "outbound channel registered");
                registry.register(Arc::new(channel));
            }
            Err(e) => warn!(%kind, error = %e, "outbound channel not available"),
        }
    }
    registry
}

/// Run the service until SIGINT or SIGTERM.
pub async fn run_serve(config: HandoffConfig) -> Result<(), HandoffError> {
    let store = Arc::new(SqliteStore::new(config.storage.clone()));
    store.initialize().await?;
    info!(path = %config.storage.database_path, "storage ready");

    let channels = build_channels(&config);
    let coordinator = Arc::new(Coordinator::new(&config, store.clone(), channels));
    let shutdown = install_signal_handler();

    let driver = tokio::spawn(coordinator.clone().run_escalation(
        Duration::from_secs(config.escalation.tick_secs),
        shutdown.clone(),
    ));

    let auth = Arc::new(StaticTokenAuth::from_config(&config.gateway));
    if let Ok(HealthStatus::Degraded(reason)) = auth.health_check().await {
        warn!(%reason, "staff dashboard is unreachable until a token is configured");
    }
    let state = GatewayState::new(
        coordinator.clone(),
        auth,
        SocketSettings::from_config(&config.gateway),
    );

    info!(agent = %config.agent.name, "handoff service starting");
    let served = start_server(&config.gateway, state, shutdown.clone()).await;

    // A bind failure returns before any signal; stop the driver either way.
    shutdown.cancel();
    if let Err(e) = driver.await {
        warn!(error = %e, "escalation driver ended abnormally");
    }
    drain_deliveries(&coordinator, DELIVERY_GRACE).await;
    store.shutdown().await?;
    info!("handoff service stopped");
    served
}
