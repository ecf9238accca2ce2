// SPDX-FileCopyrightText: 2026 Cascada Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session CRUD. `(contact_id, flow_id)` is unique; the executor
//! persists `(status, current_node_id, context)` between steps.

use cascada_core::types::{Session, SessionStatus};
use cascada_core::CascadaError;
use rusqlite::params;

use crate::database::{is_constraint_violation, map_tr_err, Database};

const COLUMNS: &str =
    "id, contact_id, flow_id, status, current_node_id, context, created_at, updated_at";

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    let status_raw: String = row.get(3)?;
    let status = status_raw.parse::<SessionStatus>().map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown session status {status_raw:?}").into(),
        )
    })?;
    Ok(Session {
        id: row.get(0)?,
        contact_id: row.get(1)?,
        flow_id: row.get(2)?,
        status,
        current_node_id: row.get(4)?,
        context: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

/// Create a new session. A unique-constraint violation on
/// `(contact_id, flow_id)` maps to `Conflict`.
pub async fn create_session(db: &Database, session: &Session) -> Result<(), CascadaError> {
    let session = session.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO sessions (id, contact_id, flow_id, status, current_node_id, \
                 context, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    session.id,
                    session.contact_id,
                    session.flow_id,
                    session.status.to_string(),
                    session.current_node_id,
                    session.context,
                    session.created_at,
                    session.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(|e| {
            if is_constraint_violation(&e) {
                CascadaError::Conflict("session already exists for this contact and flow".into())
            } else {
                map_tr_err(e)
            }
        })
}

/// Get a session by ID.
pub async fn get_session(db: &Database, id: &str) -> Result<Option<Session>, CascadaError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {COLUMNS} FROM sessions WHERE id = ?1"))?;
            match stmt.query_row(params![id], row_to_session) {
                Ok(session) => Ok(Some(session)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// The session for a `(contact, flow)` pair, if one exists.
pub async fn find_session_by_contact_and_flow(
    db: &Database,
    contact_id: &str,
    flow_id: &str,
) -> Result<Option<Session>, CascadaError> {
    let contact_id = contact_id.to_string();
    let flow_id = flow_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM sessions WHERE contact_id = ?1 AND flow_id = ?2"
            ))?;
            match stmt.query_row(params![contact_id, flow_id], row_to_session) {
                Ok(session) => Ok(Some(session)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Persist a session's `(status, current_node_id, context)`; the write
/// the executor performs between steps and on pause, completion, and
/// error.
pub async fn update_session_state(
    db: &Database,
    id: &str,
    status: SessionStatus,
    current_node_id: Option<&str>,
    context: &str,
) -> Result<(), CascadaError> {
    let id = id.to_string();
    let status = status.to_string();
    let current_node_id = current_node_id.map(str::to_string);
    let context = context.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE sessions SET status = ?1, current_node_id = ?2, context = ?3, \
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?4",
                params![status, current_node_id, context, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Reset a terminal session back to `Active` with a cleared node and an
/// empty context, the re-entry behavior for completed or errored
/// sessions.
pub async fn reset_session(db: &Database, id: &str) -> Result<(), CascadaError> {
    update_session_state(db, id, SessionStatus::Active, None, "{}").await
}

/// The contact's open (active or paused) WhatsApp sessions, most
/// recently updated first.
pub async fn find_open_sessions_for_contact(
    db: &Database,
    contact_id: &str,
) -> Result<Vec<Session>, CascadaError> {
    let contact_id = contact_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT s.id, s.contact_id, s.flow_id, s.status, s.current_node_id, s.context, \
                 s.created_at, s.updated_at
                 FROM sessions s JOIN flows f ON f.id = s.flow_id
                 WHERE s.contact_id = ?1 AND s.status IN ('active', 'paused') \
                 AND f.channel = 'whatsapp'
                 ORDER BY s.updated_at DESC",
            )?;
            let rows = stmt.query_map(params![contact_id], row_to_session)?;
            let mut sessions = Vec::new();
            for row in rows {
                sessions.push(row?);
            }
            Ok(sessions)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use cascada_core::types::now_iso;

    pub fn make_session(id: &str, contact_id: &str, flow_id: &str) -> Session {
        Session {
            id: id.to_string(),
            contact_id: contact_id.to_string(),
            flow_id: flow_id.to_string(),
            status: SessionStatus::Active,
            current_node_id: None,
            context: "{}".to_string(),
            created_at: now_iso(),
            updated_at: now_iso(),
        }
    }
}
