// SPDX-FileCopyrightText: 2026 Cascada Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tenant (user) lookups. User lifecycle is managed externally; the
//! engine only reads credentials and resolves webhook tenants.

use cascada_core::types::User;
use cascada_core::CascadaError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};

const COLUMNS: &str = "id, access_token, business_account_id, phone_number_id, verify_token, \
                       created_at, updated_at";

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        access_token: row.get(1)?,
        business_account_id: row.get(2)?,
        phone_number_id: row.get(3)?,
        verify_token: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// Create a new user.
pub async fn create_user(db: &Database, user: &User) -> Result<(), CascadaError> {
    let user = user.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO users (id, access_token, business_account_id, phone_number_id, \
                 verify_token, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    user.id,
                    user.access_token,
                    user.business_account_id,
                    user.phone_number_id,
                    user.verify_token,
                    user.created_at,
                    user.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Get a user by ID.
pub async fn get_user(db: &Database, id: &str) -> Result<Option<User>, CascadaError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {COLUMNS} FROM users WHERE id = ?1"))?;
            match stmt.query_row(params![id], row_to_user) {
                Ok(user) => Ok(Some(user)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Resolve the webhook tenant by Meta phone-number id.
pub async fn find_user_by_phone_number_id(
    db: &Database,
    phone_number_id: &str,
) -> Result<Option<User>, CascadaError> {
    let phone_number_id = phone_number_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM users WHERE phone_number_id = ?1"
            ))?;
            match stmt.query_row(params![phone_number_id], row_to_user) {
                Ok(user) => Ok(Some(user)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use cascada_core::types::now_iso;

    pub fn make_user(id: &str, phone_number_id: &str) -> User {
        User {
            id: id.to_string(),
            access_token: "token-123".to_string(),
            business_account_id: "waba-1".to_string(),
            phone_number_id: phone_number_id.to_string(),
            verify_token: Some("verify-secret".to_string()),
            created_at: now_iso(),
            updated_at: now_iso(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::make_user;
    use super::*;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn create_and_find_by_phone_number_id() {
        let (db, _dir) = setup_db().await;
        create_user(&db, &make_user("u1", "pn-100")).await.unwrap();

        let found = find_user_by_phone_number_id(&db, "pn-100").await.unwrap();
        assert_eq!(found.unwrap().id, "u1");

        let missing = find_user_by_phone_number_id(&db, "pn-999").await.unwrap();
        assert!(missing.is_none());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn get_user_by_id() {
        let (db, _dir) = setup_db().await;
        create_user(&db, &make_user("u1", "pn-100")).await.unwrap();
        let user = get_user(&db, "u1").await.unwrap().unwrap();
        assert_eq!(user.access_token, "token-123");
        assert!(get_user(&db, "nope").await.unwrap().is_none());
        db.close().await.unwrap();
    }
}
