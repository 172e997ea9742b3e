// SPDX-FileCopyrightText: 2026 Handoff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Twilio-backed channel adapters.
//!
//! [`TwilioChannel`] delivers outbound text over SMS or WhatsApp through the
//! Twilio Messages REST API. The [`webhook`] module parses Twilio's inbound
//! form posts and renders the TwiML acknowledgement.

pub mod client;
pub mod webhook;

pub use client::TwilioChannel;
pub use webhook::{twiml_empty, twiml_message, InboundForm};
