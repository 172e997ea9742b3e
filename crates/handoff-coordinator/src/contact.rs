// SPDX-FileCopyrightText: 2026 Handoff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pulls a callback address out of free-form follow-up text.

use std::sync::LazyLock;

use regex::Regex;

use handoff_core::ChannelKind;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}").unwrap()
});

// Seven or more digits, optionally led by `+` and broken up by spaces, dots,
// dashes, or parentheses.
static PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\+?\(?\d[\d\s().\-]{5,}\d").unwrap());

/// Find an email address or phone number in `text`.
///
/// Email wins over phone. Visitors on SMS or WhatsApp are reachable at their
/// sender identity, which is used when the text holds neither.
pub fn extract_contact(text: &str, channel: Option<ChannelKind>, sender: &str) -> Option<String> {
    if let Some(m) = EMAIL.find(text) {
        return Some(m.as_str().to_string());
    }
    if let Some(m) = PHONE.find(text) {
        let digits = m.as_str().chars().filter(|c| c.is_ascii_digit()).count();
        if digits >= 7 {
            return Some(m.as_str().trim().to_string());
        }
    }
    match channel {
        Some(ChannelKind::Sms | ChannelKind::Whatsapp) => Some(sender.to_string()),
        _ => None,
    }
}
