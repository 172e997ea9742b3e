// SPDX-FileCopyrightText: 2026 Handoff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP/WebSocket gateway for the Handoff coordination service.
//!
//! Visitors reach the coordinator through `POST /webchat`, the Twilio webhook
//! at `POST /sms`, and a per-visitor socket. Staff use the bearer-authenticated
//! `/admin/api` routes and the dashboard socket, which replays every open
//! conversation on connect. All state lives in the [`Coordinator`]; this
//! crate only translates transports.
//!
//! [`Coordinator`]: handoff_coordinator::Coordinator

pub mod auth;
pub mod handlers;
pub mod server;
pub mod ws;

pub use auth::StaticTokenAuth;
pub use server::{build_router, start_server, GatewayState, SocketSettings};
