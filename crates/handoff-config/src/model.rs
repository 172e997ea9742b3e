// SPDX-FileCopyrightText: 2026 Handoff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Handoff coordination service.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Handoff configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HandoffConfig {
    /// Service identity and logging.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// HTTP/WebSocket gateway settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Escalation timing and notice text.
    #[serde(default)]
    pub escalation: EscalationConfig,

    /// Per-conversation inbound rate limit.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Greeting sent on a conversation's first message.
    #[serde(default)]
    pub greeting: GreetingConfig,

    /// Twilio SMS/WhatsApp credentials.
    #[serde(default)]
    pub twilio: TwilioConfig,

    /// Staff paging and backup contact.
    #[serde(default)]
    pub notify: NotifyConfig,
}

/// Service identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name used in logs and staff pages.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_agent_name() -> String {
    "handoff".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// SQLite storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL journal mode.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_local_dir()
        .map(|d| d.join("handoff").join("handoff.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("handoff.db"))
        .display()
        .to_string()
}

fn default_wal_mode() -> bool {
    true
}

/// HTTP/WebSocket gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Bind host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Token granting admin access to the staff console and admin API.
    #[serde(default)]
    pub admin_token: Option<String>,

    /// Token granting regular staff access.
    #[serde(default)]
    pub staff_token: Option<String>,

    /// Interval between keepalive pings on idle sockets.
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,

    /// Per-socket outbound queue depth. A full queue counts as a failed delivery.
    #[serde(default = "default_socket_buffer")]
    pub socket_buffer: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            admin_token: None,
            staff_token: None,
            keepalive_secs: default_keepalive_secs(),
            socket_buffer: default_socket_buffer(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_keepalive_secs() -> u64 {
    30
}

fn default_socket_buffer() -> usize {
    64
}

/// Escalation scheduler configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EscalationConfig {
    /// Seconds between scheduler passes.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,

    /// Idle seconds before the patience notice.
    #[serde(default = "default_patience_secs")]
    pub patience_secs: u64,

    /// Idle seconds before the final notice. Must exceed `patience_secs`.
    #[serde(default = "default_final_secs")]
    pub final_secs: u64,

    #[serde(default = "default_patience_message")]
    pub patience_message: String,

    #[serde(default = "default_final_message")]
    pub final_message: String,

    /// Sent back after a follow-up request is captured.
    #[serde(default = "default_followup_ack_message")]
    pub followup_ack_message: String,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            patience_secs: default_patience_secs(),
            final_secs: default_final_secs(),
            patience_message: default_patience_message(),
            final_message: default_final_message(),
            followup_ack_message: default_followup_ack_message(),
        }
    }
}

fn default_tick_secs() -> u64 {
    30
}

fn default_patience_secs() -> u64 {
    30
}

fn default_final_secs() -> u64 {
    180
}

fn default_patience_message() -> String {
    "Thanks for your patience. A staff member will be with you shortly.".to_string()
}

fn default_final_message() -> String {
    "All staff members are currently assisting patients. Would you like to leave your \
     callback number or email and your question? We will respond shortly."
        .to_string()
}

fn default_followup_ack_message() -> String {
    "Callback request saved. We will get back to you soon.".to_string()
}

/// Sliding-window rate limit applied per conversation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Messages accepted per window.
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,

    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Returned to the sender when a message is rejected.
    #[serde(default = "default_rate_limit_notice")]
    pub notice: String,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_messages: default_max_messages(),
            window_secs: default_window_secs(),
            notice: default_rate_limit_notice(),
        }
    }
}

fn default_max_messages() -> usize {
    6
}

fn default_window_secs() -> u64 {
    10
}

fn default_rate_limit_notice() -> String {
    "You're sending messages too quickly. Please wait a moment.".to_string()
}

/// Greeting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GreetingConfig {
    #[serde(default = "default_greeting_text")]
    pub text: String,
}

impl Default for GreetingConfig {
    fn default() -> Self {
        Self {
            text: default_greeting_text(),
        }
    }
}

fn default_greeting_text() -> String {
    "Hi! Thanks for reaching out. A staff member will reply here shortly.".to_string()
}

/// Twilio REST API configuration.
///
/// Outward channels stay disabled while `account_sid` or `auth_token` is unset.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TwilioConfig {
    #[serde(default)]
    pub account_sid: Option<String>,

    #[serde(default)]
    pub auth_token: Option<String>,

    /// Sender number for SMS.
    #[serde(default)]
    pub from_number: Option<String>,

    /// Sender number for WhatsApp, without the `whatsapp:` prefix.
    #[serde(default)]
    pub whatsapp_from: Option<String>,

    /// Base URL of the Twilio REST API (overridable for tests).
    #[serde(default = "default_twilio_api_base")]
    pub api_base: String,
}

impl TwilioConfig {
    /// Whether credentials are present.
    pub fn is_configured(&self) -> bool {
        self.account_sid.as_deref().is_some_and(|s| !s.is_empty())
            && self.auth_token.as_deref().is_some_and(|s| !s.is_empty())
    }
}

impl Default for TwilioConfig {
    fn default() -> Self {
        Self {
            account_sid: None,
            auth_token: None,
            from_number: None,
            whatsapp_from: None,
            api_base: default_twilio_api_base(),
        }
    }
}

fn default_twilio_api_base() -> String {
    "https://api.twilio.com".to_string()
}

/// Out-of-band notification targets.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NotifyConfig {
    /// Phone numbers paged over SMS when a conversation opens or reopens.
    #[serde(default)]
    pub staff_contacts: Vec<String>,

    /// Phone number alerted once when a conversation reaches the final notice.
    #[serde(default)]
    pub backup_contact: Option<String>,
}
