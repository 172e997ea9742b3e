// SPDX-FileCopyrightText: 2026 Handoff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound Twilio webhook payloads and TwiML replies.

use handoff_core::ChannelKind;
use serde::Deserialize;

/// Form fields Twilio posts for an inbound SMS or WhatsApp message.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundForm {
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "Body", default)]
    pub body: String,
}

impl InboundForm {
    /// The channel and bare sender id. `whatsapp:+1555...` selects WhatsApp.
    pub fn sender(&self) -> (ChannelKind, String) {
        match self.from.strip_prefix("whatsapp:") {
            Some(number) => (ChannelKind::Whatsapp, number.to_string()),
            None => (ChannelKind::Sms, self.from.clone()),
        }
    }
}

/// Render a single-message TwiML response.
pub fn twiml_message(text: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response><Message>{}</Message></Response>",
        escape_xml(text)
    )
}

/// Render an empty TwiML response (no auto-reply).
pub fn twiml_empty() -> String {
    "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response></Response>".to_string()
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}
