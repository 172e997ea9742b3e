// SPDX-FileCopyrightText: 2026 Handoff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as escalation thresholds ordering and a non-degenerate rate window.

use crate::diagnostic::ConfigError;
use crate::model::HandoffConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &HandoffConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    if config.gateway.host.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "gateway.host must not be empty".to_string(),
        });
    }

    if config.gateway.socket_buffer == 0 {
        errors.push(ConfigError::Validation {
            message: "gateway.socket_buffer must be at least 1".to_string(),
        });
    }

    if config.gateway.keepalive_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "gateway.keepalive_secs must be greater than 0".to_string(),
        });
    }

    if config.escalation.tick_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "escalation.tick_secs must be greater than 0".to_string(),
        });
    }

    if config.escalation.final_secs <= config.escalation.patience_secs {
        errors.push(ConfigError::Validation {
            message: format!(
                "escalation.final_secs ({}) must be greater than escalation.patience_secs ({})",
                config.escalation.final_secs, config.escalation.patience_secs
            ),
        });
    }

    if config.rate_limit.max_messages == 0 {
        errors.push(ConfigError::Validation {
            message: "rate_limit.max_messages must be at least 1".to_string(),
        });
    }

    if config.rate_limit.window_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "rate_limit.window_secs must be greater than 0".to_string(),
        });
    }

    if let Some(token) = &config.gateway.admin_token
        && token.trim().is_empty()
    {
        errors.push(ConfigError::Validation {
            message: "gateway.admin_token must not be empty when set".to_string(),
        });
    }

    // A half-configured Twilio block silently disables outward delivery.
    if config.twilio.account_sid.is_some() != config.twilio.auth_token.is_some() {
        errors.push(ConfigError::Validation {
            message: "twilio.account_sid and twilio.auth_token must be set together".to_string(),
        });
    }

    if !config.notify.staff_contacts.is_empty() && !config.twilio.is_configured() {
        errors.push(ConfigError::Validation {
            message: "notify.staff_contacts requires twilio credentials".to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        assert!(validate_config(&HandoffConfig::default()).is_ok());
    }

    #[test]
    fn final_must_exceed_patience() {
        let mut config = HandoffConfig::default();
        config.escalation.patience_secs = 200;
        config.escalation.final_secs = 200;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("final_secs"));
    }

    #[test]
    fn collects_all_errors() {
        let mut config = HandoffConfig::default();
        config.storage.database_path = "  ".to_string();
        config.rate_limit.window_secs = 0;
        config.rate_limit.max_messages = 0;
        config.escalation.tick_secs = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn half_configured_twilio_is_rejected() {
        let mut config = HandoffConfig::default();
        config.twilio.account_sid = Some("AC123".to_string());
        let errors = validate_config(&config).unwrap_err();
        assert!(errors[0].to_string().contains("twilio"));
    }

    #[test]
    fn staff_paging_needs_twilio() {
        let mut config = HandoffConfig::default();
        config.notify.staff_contacts = vec!["+15550001111".to_string()];
        assert!(validate_config(&config).is_err());

        config.twilio.account_sid = Some("AC123".to_string());
        config.twilio.auth_token = Some("secret".to_string());
        assert!(validate_config(&config).is_ok());
    }
}
