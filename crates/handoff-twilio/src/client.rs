// SPDX-FileCopyrightText: 2026 Handoff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound delivery through the Twilio Messages API.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use handoff_config::model::TwilioConfig;
use handoff_core::{
    AdapterType, ChannelAdapter, ChannelKind, HandoffError, HealthStatus, MessageId,
    PluginAdapter,
};

const WHATSAPP_PREFIX: &str = "whatsapp:";

#[derive(Debug, Deserialize)]
struct MessageResource {
    sid: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: Option<i64>,
    message: String,
}

/// Sends text to phone numbers over one Twilio-backed channel kind.
#[derive(Debug, Clone)]
pub struct TwilioChannel {
    client: reqwest::Client,
    kind: ChannelKind,
    account_sid: String,
    auth_token: String,
    from: String,
    api_base: String,
}

impl TwilioChannel {
    /// Build an adapter for `kind` (SMS or WhatsApp) from the `[twilio]` section.
    pub fn new(kind: ChannelKind, config: &TwilioConfig) -> Result<Self, HandoffError> {
        let (Some(account_sid), Some(auth_token)) =
            (config.account_sid.clone(), config.auth_token.clone())
        else {
            return Err(HandoffError::Config(
                "twilio.account_sid and twilio.auth_token are required".to_string(),
            ));
        };

        let from = match kind {
            ChannelKind::Sms => config.from_number.clone(),
            ChannelKind::Whatsapp => config
                .whatsapp_from
                .clone()
                .or_else(|| config.from_number.clone()),
            other => {
                return Err(HandoffError::Config(format!(
                    "twilio cannot deliver to the {other} channel"
                )));
            }
        }
        .ok_or_else(|| HandoffError::Config(format!("no twilio sender number for {kind}")))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| HandoffError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            kind,
            account_sid,
            auth_token,
            from,
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base, self.account_sid
        )
    }

    /// Apply the channel's address scheme (`whatsapp:+1555...` for WhatsApp).
    fn address(&self, number: &str) -> String {
        match self.kind {
            ChannelKind::Whatsapp if !number.starts_with(WHATSAPP_PREFIX) => {
                format!("{WHATSAPP_PREFIX}{number}")
            }
            _ => number.to_string(),
        }
    }
}

#[async_trait]
impl PluginAdapter for TwilioChannel {
    fn name(&self) -> &str {
        match self.kind {
            ChannelKind::Whatsapp => "twilio-whatsapp",
            _ => "twilio-sms",
        }
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
impl ChannelAdapter for TwilioChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn send_text(&self, destination: &str, text: &str) -> Result<MessageId, HandoffError> {
        let form = [
            ("From", self.address(&self.from)),
            ("To", self.address(destination)),
            ("Body", text.to_string()),
        ];

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(|e| HandoffError::DeliveryFailed {
                message: format!("twilio request failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        debug!(status = %status, kind = %self.kind, "twilio response received");

        if !status.is_success() {
            let detail = match serde_json::from_str::<ApiError>(&body) {
                Ok(err) => match err.code {
                    Some(code) => format!("twilio error {code}: {}", err.message),
                    None => err.message,
                },
                Err(_) => format!("twilio returned {status}: {body}"),
            };
            warn!(kind = %self.kind, %detail, "outbound message rejected");
            return Err(HandoffError::DeliveryFailed {
                message: detail,
                source: None,
            });
        }

        let resource: MessageResource =
            serde_json::from_str(&body).map_err(|e| HandoffError::DeliveryFailed {
                message: format!("unreadable twilio response: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(MessageId(resource.sid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base: &str) -> TwilioConfig {
        TwilioConfig {
            account_sid: Some("AC123".to_string()),
            auth_token: Some("secret".to_string()),
            from_number: Some("+15550000000".to_string()),
            whatsapp_from: Some("+15559999999".to_string()),
            api_base: base.to_string(),
        }
    }

    #[test]
    fn missing_credentials_is_a_config_error() {
        let mut cfg = config("http://localhost");
        cfg.auth_token = None;
        let err = TwilioChannel::new(ChannelKind::Sms, &cfg).unwrap_err();
        assert!(matches!(err, HandoffError::Config(_)));
    }

    #[test]
    fn webchat_is_not_a_twilio_channel() {
        let err = TwilioChannel::new(ChannelKind::Webchat, &config("http://x")).unwrap_err();
        assert!(matches!(err, HandoffError::Config(_)));
    }

    #[tokio::test]
    async fn sms_send_posts_form_with_basic_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2010-04-01/Accounts/AC123/Messages.json"))
            .and(header_exists("authorization"))
            .and(body_string_contains("To=%2B15551112222"))
            .and(body_string_contains("Body=hello"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(serde_json::json!({"sid": "SM1"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let channel = TwilioChannel::new(ChannelKind::Sms, &config(&server.uri())).unwrap();
        let id = channel.send_text("+15551112222", "hello").await.unwrap();
        assert_eq!(id, MessageId("SM1".to_string()));
    }

    #[tokio::test]
    async fn whatsapp_addresses_are_prefixed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("From=whatsapp%3A%2B15559999999"))
            .and(body_string_contains("To=whatsapp%3A%2B15551112222"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(serde_json::json!({"sid": "SM2"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let channel = TwilioChannel::new(ChannelKind::Whatsapp, &config(&server.uri())).unwrap();
        channel.send_text("+15551112222", "hi").await.unwrap();
    }

    #[tokio::test]
    async fn api_error_becomes_delivery_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "code": 21211,
                "message": "The 'To' number is not a valid phone number."
            })))
            .mount(&server)
            .await;

        let channel = TwilioChannel::new(ChannelKind::Sms, &config(&server.uri())).unwrap();
        let err = channel.send_text("bogus", "hello").await.unwrap_err();
        match err {
            HandoffError::DeliveryFailed { message, .. } => assert!(message.contains("21211")),
            other => panic!("expected DeliveryFailed, got {other:?}"),
        }
    }
}
