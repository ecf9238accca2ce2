// SPDX-FileCopyrightText: 2026 Cascada Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Contact CRUD. `(user_id, phone)` is unique; insert races surface as
//! [`CascadaError::Conflict`] so the resolver can re-read.

use cascada_core::types::Contact;
use cascada_core::CascadaError;
use rusqlite::{params, params_from_iter};

use crate::database::{is_constraint_violation, map_tr_err, Database};

const COLUMNS: &str = "id, user_id, phone, name, created_at, updated_at";

fn row_to_contact(row: &rusqlite::Row<'_>) -> rusqlite::Result<Contact> {
    Ok(Contact {
        id: row.get(0)?,
        user_id: row.get(1)?,
        phone: row.get(2)?,
        name: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

/// Create a new contact. A unique-constraint violation on
/// `(user_id, phone)` maps to `Conflict`.
pub async fn create_contact(db: &Database, contact: &Contact) -> Result<(), CascadaError> {
    let contact = contact.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO contacts (id, user_id, phone, name, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    contact.id,
                    contact.user_id,
                    contact.phone,
                    contact.name,
                    contact.created_at,
                    contact.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(|e| {
            if is_constraint_violation(&e) {
                CascadaError::Conflict("contact already exists for this phone".into())
            } else {
                map_tr_err(e)
            }
        })
}

/// Get a contact by ID.
pub async fn get_contact(db: &Database, id: &str) -> Result<Option<Contact>, CascadaError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {COLUMNS} FROM contacts WHERE id = ?1"))?;
            match stmt.query_row(params![id], row_to_contact) {
                Ok(contact) => Ok(Some(contact)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Find the tenant's contact whose phone matches any entry of the
/// search set (canonical, raw, and alternate forms).
pub async fn find_contact_by_phones(
    db: &Database,
    user_id: &str,
    phones: &[String],
) -> Result<Option<Contact>, CascadaError> {
    if phones.is_empty() {
        return Ok(None);
    }
    let user_id = user_id.to_string();
    let phones = phones.to_vec();
    db.connection()
        .call(move |conn| {
            let placeholders = vec!["?"; phones.len()].join(", ");
            let sql = format!(
                "SELECT {COLUMNS} FROM contacts WHERE user_id = ? AND phone IN ({placeholders}) \
                 LIMIT 1"
            );
            let mut stmt = conn.prepare(&sql)?;
            let params_iter = std::iter::once(user_id.clone()).chain(phones.iter().cloned());
            match stmt.query_row(params_from_iter(params_iter), row_to_contact) {
                Ok(contact) => Ok(Some(contact)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Renormalize a contact's stored phone to its canonical form.
pub async fn update_contact_phone(
    db: &Database,
    id: &str,
    phone: &str,
) -> Result<(), CascadaError> {
    let id = id.to_string();
    let phone = phone.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE contacts SET phone = ?1, \
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?2",
                params![phone, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Update a contact's profile name.
pub async fn update_contact_name(
    db: &Database,
    id: &str,
    name: &str,
) -> Result<(), CascadaError> {
    let id = id.to_string();
    let name = name.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE contacts SET name = ?1, \
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?2",
                params![name, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::users::test_support::make_user;
    use crate::queries::users::create_user;
    use cascada_core::types::now_iso;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        create_user(&db, &make_user("u1", "pn-100")).await.unwrap();
        (db, dir)
    }

    fn make_contact(id: &str, phone: &str) -> Contact {
        Contact {
            id: id.to_string(),
            user_id: "u1".to_string(),
            phone: phone.to_string(),
            name: None,
            created_at: now_iso(),
            updated_at: now_iso(),
        }
    }

    #[tokio::test]
    async fn create_and_find_by_search_set() {
        let (db, _dir) = setup_db().await;
        create_contact(&db, &make_contact("c1", "5491122223333"))
            .await
            .unwrap();

        let found = find_contact_by_phones(
            &db,
            "u1",
            &["+549 11 2222 3333".to_string(), "5491122223333".to_string()],
        )
        .await
        .unwrap();
        assert_eq!(found.unwrap().id, "c1");

        let missing = find_contact_by_phones(&db, "u1", &["000".to_string()])
            .await
            .unwrap();
        assert!(missing.is_none());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_phone_is_a_conflict() {
        let (db, _dir) = setup_db().await;
        create_contact(&db, &make_contact("c1", "111")).await.unwrap();
        let err = create_contact(&db, &make_contact("c2", "111"))
            .await
            .unwrap_err();
        assert!(matches!(err, CascadaError::Conflict(_)), "got: {err:?}");
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn phone_and_name_repairs() {
        let (db, _dir) = setup_db().await;
        create_contact(&db, &make_contact("c1", "+54 911"))
            .await
            .unwrap();
        update_contact_phone(&db, "c1", "54911").await.unwrap();
        update_contact_name(&db, "c1", "Ana").await.unwrap();

        let contact = get_contact(&db, "c1").await.unwrap().unwrap();
        assert_eq!(contact.phone, "54911");
        assert_eq!(contact.name.as_deref(), Some("Ana"));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn empty_search_set_finds_nothing() {
        let (db, _dir) = setup_db().await;
        assert!(find_contact_by_phones(&db, "u1", &[]).await.unwrap().is_none());
        db.close().await.unwrap();
    }
}
