// SPDX-FileCopyrightText: 2026 Cascada Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Broadcast delivery-status reconciliation.
//!
//! Meta status callbacks map onto canonical recipient states; broadcast
//! aggregates move by membership deltas against the success/failure
//! sets, applied through a single atomic counter update. One status's
//! failure never stops its siblings.

use cascada_core::types::{now_iso, User};
use cascada_core::CascadaError;
use cascada_storage::queries::broadcasts;
use cascada_storage::Database;
use serde_json::Value;
use tracing::{debug, warn};

/// Maps a raw Meta status to its canonical recipient state. Unknown
/// statuses are capitalized as-is.
pub fn canonical_status(raw: &str) -> String {
    match raw.to_lowercase().as_str() {
        "sent" => "Sent".to_string(),
        "delivered" => "Delivered".to_string(),
        "read" => "Read".to_string(),
        "failed" | "undelivered" | "deleted" => "Failed".to_string(),
        "warning" => "Warning".to_string(),
        "pending" | "queued" => "Pending".to_string(),
        _ => capitalize(raw),
    }
}

fn capitalize(raw: &str) -> String {
    let mut chars = raw.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

/// Whether a canonical status counts toward `success_count`.
pub fn is_success_status(status: &str) -> bool {
    matches!(status, "Sent" | "Delivered" | "Read")
}

/// Whether a canonical status counts toward `failure_count`.
pub fn is_failure_status(status: &str) -> bool {
    status == "Failed"
}

/// Parses a status callback timestamp: epoch seconds (number or numeric
/// string) or an ISO string; anything else falls back to now.
pub fn parse_status_timestamp(raw: Option<&Value>) -> String {
    let from_epoch = |secs: i64| {
        chrono::DateTime::from_timestamp(secs, 0)
            .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
    };
    match raw {
        Some(Value::Number(n)) => n.as_i64().and_then(from_epoch).unwrap_or_else(now_iso),
        Some(Value::String(s)) => {
            if let Ok(secs) = s.trim().parse::<i64>() {
                from_epoch(secs).unwrap_or_else(now_iso)
            } else if chrono::DateTime::parse_from_rfc3339(s).is_ok() {
                s.clone()
            } else {
                now_iso()
            }
        }
        _ => now_iso(),
    }
}

/// Extracts the most specific failure detail from a status's first
/// error entry: `error_data.details`, then `message`, then `title`,
/// then the error code, then a generic message.
pub fn extract_status_error(status: &Value) -> String {
    let first = status
        .get("errors")
        .and_then(Value::as_array)
        .and_then(|errors| errors.first());
    if let Some(error) = first {
        if let Some(details) = error
            .get("error_data")
            .and_then(|d| d.get("details"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
        {
            return details.to_string();
        }
        for key in ["message", "title"] {
            if let Some(text) = error.get(key).and_then(Value::as_str).filter(|s| !s.is_empty()) {
                return text.to_string();
            }
        }
        if let Some(code) = error.get("code").and_then(Value::as_i64) {
            return format!("Error code {code}");
        }
    }
    "Meta reported delivery failure".to_string()
}

/// Reconciles one Meta status callback against the tenant's broadcast
/// recipients.
pub async fn reconcile_status(
    db: &Database,
    user: &User,
    status: &Value,
) -> Result<(), CascadaError> {
    let Some(message_id) = status
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
    else {
        return Ok(());
    };

    let Some(recipient) =
        broadcasts::find_recipient_by_message_id(db, message_id, &user.id).await?
    else {
        debug!(message_id, "status for an unknown recipient, ignoring");
        return Ok(());
    };

    let new_status = status
        .get("status")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(canonical_status)
        .unwrap_or_else(|| recipient.status.clone());

    let error = if is_failure_status(&new_status) {
        Some(extract_status_error(status))
    } else {
        None
    };
    let status_updated_at = parse_status_timestamp(status.get("timestamp"));
    let conversation_id = status
        .get("conversation")
        .and_then(|c| c.get("id"))
        .and_then(Value::as_str);

    // Membership deltas: +1 entering a set, -1 leaving it, 0 otherwise.
    let success_delta =
        i64::from(is_success_status(&new_status)) - i64::from(is_success_status(&recipient.status));
    let failure_delta =
        i64::from(is_failure_status(&new_status)) - i64::from(is_failure_status(&recipient.status));

    broadcasts::update_recipient_status(
        db,
        &recipient.id,
        &new_status,
        error.as_deref(),
        &status_updated_at,
        conversation_id,
    )
    .await?;
    broadcasts::adjust_broadcast_counts(db, &recipient.broadcast_id, success_delta, failure_delta)
        .await?;

    debug!(
        recipient = recipient.id.as_str(),
        from = recipient.status.as_str(),
        to = new_status.as_str(),
        "recipient status reconciled"
    );
    Ok(())
}

/// Reconciles a batch, isolating per-status failures.
pub async fn reconcile_statuses(db: &Database, user: &User, statuses: &[Value]) {
    for status in statuses {
        if let Err(err) = reconcile_status(db, user, status).await {
            warn!(error = %err, "status reconciliation failed, continuing with siblings");
        }
    }
}
