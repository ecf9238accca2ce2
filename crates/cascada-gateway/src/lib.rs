// SPDX-FileCopyrightText: 2026 Cascada Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP surface for the Cascada flow engine.
//!
//! Routes:
//! - `GET /health` — liveness.
//! - `GET /meta/webhook` — Meta webhook verification handshake.
//! - `POST /meta/webhook` — inbound messages and delivery statuses.
//! - `POST /flows/:flow_id/trigger` — manual flow trigger.

pub mod flows;
pub mod server;
pub mod webhook;

pub use server::{build_router, start_server, GatewayState};
