// SPDX-FileCopyrightText: 2026 Cascada Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Meta Graph API integration for the Cascada flow engine.
//!
//! [`payload`] translates flow-level send requests into Graph
//! `/messages` payloads; [`client`] owns the HTTP transport with its
//! 15-second deadline, error-message extraction, token-expiry
//! classification, and allow-list auto-enrollment.

pub mod client;
pub mod payload;

pub use client::{MetaClient, MetaCredentials, SendOutcome, TOKEN_EXPIRED_MESSAGE};
pub use payload::{canonical_phone, OutboundMessage, TemplateComponent};
