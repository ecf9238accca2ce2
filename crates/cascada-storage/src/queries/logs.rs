// SPDX-FileCopyrightText: 2026 Cascada Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only session logs: one `(status, context)` snapshot per
//! inbound processing.

use cascada_core::types::SessionLog;
use cascada_core::CascadaError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};

/// Append a snapshot of a session's state. Returns the log entry ID.
pub async fn append_session_log(
    db: &Database,
    session_id: &str,
    status: &str,
    context: &str,
) -> Result<i64, CascadaError> {
    let session_id = session_id.to_string();
    let status = status.to_string();
    let context = context.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO session_logs (session_id, status, context) VALUES (?1, ?2, ?3)",
                params![session_id, status, context],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// All snapshots for a session, oldest first.
pub async fn list_session_logs(
    db: &Database,
    session_id: &str,
) -> Result<Vec<SessionLog>, CascadaError> {
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, status, context, created_at
                 FROM session_logs WHERE session_id = ?1 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map(params![session_id], |row| {
                Ok(SessionLog {
                    id: row.get(0)?,
                    session_id: row.get(1)?,
                    status: row.get(2)?,
                    context: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?;
            let mut logs = Vec::new();
            for row in rows {
                logs.push(row?);
            }
            Ok(logs)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn appends_are_ordered_and_scoped() {
        let (db, _dir) = setup_db().await;
        append_session_log(&db, "s1", "active", "{}").await.unwrap();
        append_session_log(&db, "s1", "completed", r#"{"endReason":"end"}"#)
            .await
            .unwrap();
        append_session_log(&db, "s2", "errored", "{}").await.unwrap();

        let logs = list_session_logs(&db, "s1").await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].status, "active");
        assert_eq!(logs[1].status, "completed");
        assert!(logs[1].context.contains("endReason"));
        db.close().await.unwrap();
    }
}
