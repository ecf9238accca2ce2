// SPDX-FileCopyrightText: 2026 Cascada Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and
//! lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread. Do NOT create additional Connection instances for writes.

use cascada_core::CascadaError;

/// Handle to the SQLite database. Cheap to clone; all clones share the
/// same background connection.
#[derive(Clone)]
pub struct Database {
    connection: tokio_rusqlite::Connection,
}

impl Database {
    /// Opens (creating if needed) the database at `path`, applies WAL
    /// and foreign-key pragmas, and runs pending migrations.
    pub async fn open(path: &str) -> Result<Self, CascadaError> {
        let migrate_path = path.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), CascadaError> {
            let mut conn = rusqlite::Connection::open(&migrate_path).map_err(storage_err)?;
            conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get::<_, String>(0))
                .map_err(storage_err)?;
            crate::migrations::run_migrations(&mut conn)?;
            Ok(())
        })
        .await
        .map_err(|e| CascadaError::Internal(format!("migration task panicked: {e}")))??;

        let connection = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(map_tr_err)?;
        connection
            .call(|conn| {
                conn.pragma_update(None, "foreign_keys", "ON")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;

        tracing::debug!(path, "database opened");
        Ok(Self { connection })
    }

    /// The shared async connection. Every query goes through
    /// `connection().call(...)`.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.connection
    }

    /// Closes the background connection.
    pub async fn close(self) -> Result<(), CascadaError> {
        self.connection.close().await.map_err(map_tr_err)
    }
}

/// Adapts a tokio-rusqlite error into the workspace error type.
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error) -> CascadaError {
    CascadaError::Storage {
        source: Box::new(e),
    }
}

fn storage_err(e: rusqlite::Error) -> CascadaError {
    CascadaError::Storage {
        source: Box::new(e),
    }
}

/// True when the error is a SQLite constraint violation, the signal the
/// resolver uses to detect a concurrent insert on the same unique key.
pub(crate) fn is_constraint_violation(e: &tokio_rusqlite::Error) -> bool {
    matches!(
        e,
        tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
