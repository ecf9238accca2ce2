// SPDX-FileCopyrightText: 2026 Cascada Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persisted domain entities.
//!
//! These types represent the rows stored in the SQLite database.
//! Timestamps are ISO 8601 UTC strings; JSON blobs (flow definitions,
//! session contexts) are stored as TEXT and parsed at the edges.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// A tenant owning flows, contacts, and broadcasts. Lifecycle and
/// credential management live outside the engine; the engine only reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique tenant identifier.
    pub id: String,
    /// Meta Graph API access token.
    pub access_token: String,
    /// WhatsApp Business Account id.
    pub business_account_id: String,
    /// Phone-number id used both for sending and for webhook tenant
    /// resolution.
    pub phone_number_id: String,
    /// Webhook verification token for this tenant, if one is set.
    pub verify_token: Option<String>,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
    /// ISO 8601 last-update timestamp.
    pub updated_at: String,
}

/// An end user reachable over WhatsApp. Unique per `(user_id, phone)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    /// Unique contact identifier.
    pub id: String,
    /// Owning tenant.
    pub user_id: String,
    /// Canonical phone, digits only.
    pub phone: String,
    /// Profile name, when one was reported by the channel.
    pub name: Option<String>,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
    /// ISO 8601 last-update timestamp.
    pub updated_at: String,
}

/// Lifecycle state of a flow. Only `Active` flows are candidates for
/// inbound routing.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FlowStatus {
    Draft,
    Active,
    Paused,
    Archived,
}

/// A named directed graph of typed nodes driving one dialogue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flow {
    /// Unique flow identifier.
    pub id: String,
    /// Owning tenant.
    pub user_id: String,
    /// Display name.
    pub name: String,
    /// Trigger keyword matched against inbound text during flow
    /// selection. `"default"` (after normalization) marks the fallback.
    pub trigger: String,
    /// Lifecycle state.
    pub status: FlowStatus,
    /// Delivery channel. Only `"whatsapp"` is routed today.
    pub channel: String,
    /// The node/edge graph as JSON text; must survive a round-trip
    /// through the sanitizer without semantic loss.
    pub definition: String,
    /// Published Meta Flow id, for `whatsapp_flow` nodes.
    pub meta_flow_id: Option<String>,
    /// Meta Flow token, for `whatsapp_flow` nodes.
    pub meta_flow_token: Option<String>,
    /// Meta Flow message version.
    pub meta_flow_version: Option<String>,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
    /// ISO 8601 last-update timestamp; used for trigger-match tie-breaks.
    pub updated_at: String,
}

/// Runtime state of a session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Paused,
    Completed,
    Errored,
}

/// The runtime state of a flow for a specific contact. Unique per
/// `(contact_id, flow_id)`; survives pauses indefinitely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique session identifier.
    pub id: String,
    /// The contact this dialogue is with.
    pub contact_id: String,
    /// The flow being interpreted.
    pub flow_id: String,
    /// Runtime state.
    pub status: SessionStatus,
    /// The node the session is parked on, when paused mid-flow. Must
    /// reference a node in the latest flow definition.
    pub current_node_id: Option<String>,
    /// The per-session JSON bag, as text.
    pub context: String,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
    /// ISO 8601 last-update timestamp.
    pub updated_at: String,
}

/// A bulk send job. Aggregate counters are maintained by derived
/// deltas during status reconciliation, never recomputed from scratch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Broadcast {
    /// Unique broadcast identifier.
    pub id: String,
    /// Owning tenant.
    pub user_id: String,
    /// Number of recipients enqueued.
    pub total_recipients: i64,
    /// Recipients whose latest status is in the success set.
    pub success_count: i64,
    /// Recipients whose latest status is in the failure set.
    pub failure_count: i64,
    /// Job status label.
    pub status: String,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
    /// ISO 8601 last-update timestamp.
    pub updated_at: String,
}

/// One recipient of a broadcast, located by `message_id` when Meta
/// delivery statuses arrive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastRecipient {
    /// Unique recipient identifier.
    pub id: String,
    /// Parent broadcast.
    pub broadcast_id: String,
    /// The contact the message was addressed to.
    pub contact_id: String,
    /// Canonical delivery status (`Pending`, `Sent`, `Delivered`,
    /// `Read`, `Failed`, `Warning`, or a capitalized unknown).
    pub status: String,
    /// Failure detail, cleared on non-failure statuses.
    pub error: Option<String>,
    /// ISO 8601 timestamp of the latest status callback.
    pub status_updated_at: Option<String>,
    /// Meta message id, set after dispatch.
    pub message_id: Option<String>,
    /// Meta conversation id, when reported.
    pub conversation_id: Option<String>,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
    /// ISO 8601 last-update timestamp.
    pub updated_at: String,
}

/// Append-only snapshot of a session's `(status, context)` taken after
/// each inbound processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionLog {
    /// Auto-increment log id.
    pub id: i64,
    /// The session this snapshot belongs to.
    pub session_id: String,
    /// Session status at snapshot time.
    pub status: String,
    /// Session context at snapshot time, as JSON text.
    pub context: String,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
}

/// Media kinds accepted by media nodes and the outbound builder.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Document,
}

/// Returns the current time as an ISO 8601 UTC string, the format every
/// persisted timestamp uses.
pub fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            FlowStatus::Draft,
            FlowStatus::Active,
            FlowStatus::Paused,
            FlowStatus::Archived,
        ] {
            let s = status.to_string();
            assert_eq!(s.parse::<FlowStatus>().unwrap(), status);
        }
        assert_eq!(FlowStatus::Active.to_string(), "active");
        assert_eq!(SessionStatus::Errored.to_string(), "errored");
        assert_eq!("completed".parse::<SessionStatus>().unwrap(), SessionStatus::Completed);
    }

    #[test]
    fn media_kind_serializes_lowercase() {
        assert_eq!(MediaKind::Image.to_string(), "image");
        assert_eq!("document".parse::<MediaKind>().unwrap(), MediaKind::Document);
        let json = serde_json::to_string(&MediaKind::Video).unwrap();
        assert_eq!(json, "\"video\"");
    }

    #[test]
    fn now_iso_is_utc_millis() {
        let ts = now_iso();
        assert!(ts.ends_with('Z'), "got: {ts}");
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }
}
