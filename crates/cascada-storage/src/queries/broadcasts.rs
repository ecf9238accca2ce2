// SPDX-FileCopyrightText: 2026 Cascada Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Broadcast and recipient operations.
//!
//! Aggregate counters move by atomic `SET x = x + ?` deltas so that
//! concurrent status reconciliations never lose each other's
//! adjustments.

use cascada_core::types::{Broadcast, BroadcastRecipient};
use cascada_core::CascadaError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};

const BROADCAST_COLUMNS: &str =
    "id, user_id, total_recipients, success_count, failure_count, status, created_at, updated_at";

const RECIPIENT_COLUMNS: &str = "id, broadcast_id, contact_id, status, error, status_updated_at, \
                                 message_id, conversation_id, created_at, updated_at";

fn row_to_broadcast(row: &rusqlite::Row<'_>) -> rusqlite::Result<Broadcast> {
    Ok(Broadcast {
        id: row.get(0)?,
        user_id: row.get(1)?,
        total_recipients: row.get(2)?,
        success_count: row.get(3)?,
        failure_count: row.get(4)?,
        status: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn row_to_recipient(row: &rusqlite::Row<'_>) -> rusqlite::Result<BroadcastRecipient> {
    Ok(BroadcastRecipient {
        id: row.get(0)?,
        broadcast_id: row.get(1)?,
        contact_id: row.get(2)?,
        status: row.get(3)?,
        error: row.get(4)?,
        status_updated_at: row.get(5)?,
        message_id: row.get(6)?,
        conversation_id: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

/// Create a new broadcast.
pub async fn create_broadcast(db: &Database, broadcast: &Broadcast) -> Result<(), CascadaError> {
    let broadcast = broadcast.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO broadcasts (id, user_id, total_recipients, success_count, \
                 failure_count, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    broadcast.id,
                    broadcast.user_id,
                    broadcast.total_recipients,
                    broadcast.success_count,
                    broadcast.failure_count,
                    broadcast.status,
                    broadcast.created_at,
                    broadcast.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Get a broadcast by ID.
pub async fn get_broadcast(db: &Database, id: &str) -> Result<Option<Broadcast>, CascadaError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {BROADCAST_COLUMNS} FROM broadcasts WHERE id = ?1"
            ))?;
            match stmt.query_row(params![id], row_to_broadcast) {
                Ok(broadcast) => Ok(Some(broadcast)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Create a new broadcast recipient.
pub async fn create_recipient(
    db: &Database,
    recipient: &BroadcastRecipient,
) -> Result<(), CascadaError> {
    let recipient = recipient.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO broadcast_recipients (id, broadcast_id, contact_id, status, error, \
                 status_updated_at, message_id, conversation_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    recipient.id,
                    recipient.broadcast_id,
                    recipient.contact_id,
                    recipient.status,
                    recipient.error,
                    recipient.status_updated_at,
                    recipient.message_id,
                    recipient.conversation_id,
                    recipient.created_at,
                    recipient.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Get a recipient by ID.
pub async fn get_recipient(
    db: &Database,
    id: &str,
) -> Result<Option<BroadcastRecipient>, CascadaError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {RECIPIENT_COLUMNS} FROM broadcast_recipients WHERE id = ?1"
            ))?;
            match stmt.query_row(params![id], row_to_recipient) {
                Ok(recipient) => Ok(Some(recipient)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Locate the recipient a Meta status callback refers to, scoped to the
/// webhook tenant.
pub async fn find_recipient_by_message_id(
    db: &Database,
    message_id: &str,
    user_id: &str,
) -> Result<Option<BroadcastRecipient>, CascadaError> {
    let message_id = message_id.to_string();
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT r.id, r.broadcast_id, r.contact_id, r.status, r.error, \
                 r.status_updated_at, r.message_id, r.conversation_id, r.created_at, r.updated_at
                 FROM broadcast_recipients r JOIN broadcasts b ON b.id = r.broadcast_id
                 WHERE r.message_id = ?1 AND b.user_id = ?2",
            )?;
            match stmt.query_row(params![message_id, user_id], row_to_recipient) {
                Ok(recipient) => Ok(Some(recipient)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Apply a reconciled status to a recipient. `error` is written as
/// given (clearing it on non-failure statuses); `conversation_id` is
/// only overwritten when a new one is provided.
pub async fn update_recipient_status(
    db: &Database,
    id: &str,
    status: &str,
    error: Option<&str>,
    status_updated_at: &str,
    conversation_id: Option<&str>,
) -> Result<(), CascadaError> {
    let id = id.to_string();
    let status = status.to_string();
    let error = error.map(str::to_string);
    let status_updated_at = status_updated_at.to_string();
    let conversation_id = conversation_id.map(str::to_string);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE broadcast_recipients SET status = ?1, error = ?2, \
                 status_updated_at = ?3, conversation_id = COALESCE(?4, conversation_id), \
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?5",
                params![status, error, status_updated_at, conversation_id, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Adjust a broadcast's aggregate counters by deltas in a single atomic
/// update. Never read-modify-write: concurrent reconciliations must not
/// lose each other's adjustments.
pub async fn adjust_broadcast_counts(
    db: &Database,
    broadcast_id: &str,
    success_delta: i64,
    failure_delta: i64,
) -> Result<(), CascadaError> {
    if success_delta == 0 && failure_delta == 0 {
        return Ok(());
    }
    let broadcast_id = broadcast_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE broadcasts SET success_count = success_count + ?1, \
                 failure_count = failure_count + ?2, \
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?3",
                params![success_delta, failure_delta, broadcast_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
