// SPDX-FileCopyrightText: 2026 Cascada Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Contact and session resolution.
//!
//! Contacts are created on first inbound message; a unique-constraint
//! race on `(user_id, phone)` is handled by re-reading. Sessions are
//! unique per `(contact_id, flow_id)`; terminal sessions reset to a
//! fresh Active state on re-entry.

use cascada_core::types::{Contact, Flow, FlowStatus, now_iso, Session, SessionStatus};
use cascada_core::CascadaError;
use cascada_meta::canonical_phone;
use cascada_storage::queries::{contacts, flows, sessions};
use cascada_storage::Database;
use tracing::{debug, warn};

/// Resolves (or creates) the tenant's contact for a phone number.
///
/// The lookup searches the canonical digits-only form, the raw trimmed
/// form when different, and every alternate in both forms. The stored
/// phone is renormalized and the profile name repaired when they
/// drifted; repair failures are logged but non-fatal.
pub async fn get_or_create_contact(
    db: &Database,
    user_id: &str,
    phone: &str,
    name: Option<&str>,
    alternate_phones: &[String],
) -> Result<Contact, CascadaError> {
    let raw = phone.trim();
    let canonical = canonical_phone(raw);
    if canonical.is_empty() {
        return Err(CascadaError::validation(
            "contact phone must contain digits",
        ));
    }

    let mut search_set = vec![canonical.clone()];
    if raw != canonical && !raw.is_empty() {
        search_set.push(raw.to_string());
    }
    for alternate in alternate_phones {
        let alt_raw = alternate.trim();
        let alt_canonical = canonical_phone(alt_raw);
        for form in [alt_canonical.as_str(), alt_raw] {
            if !form.is_empty() && !search_set.iter().any(|s| s == form) {
                search_set.push(form.to_string());
            }
        }
    }

    let existing = contacts::find_contact_by_phones(db, user_id, &search_set).await?;
    let mut contact = match existing {
        Some(contact) => contact,
        None => {
            let candidate = Contact {
                id: uuid::Uuid::new_v4().to_string(),
                user_id: user_id.to_string(),
                phone: canonical.clone(),
                name: name.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string),
                created_at: now_iso(),
                updated_at: now_iso(),
            };
            match contacts::create_contact(db, &candidate).await {
                Ok(()) => return Ok(candidate),
                Err(CascadaError::Conflict(_)) => {
                    // Lost the race to a concurrent insert; re-read.
                    debug!(user_id, "contact insert raced, re-reading");
                    contacts::find_contact_by_phones(db, user_id, &search_set)
                        .await?
                        .ok_or_else(|| {
                            CascadaError::Conflict(
                                "contact insert raced and re-read found nothing".into(),
                            )
                        })?
                }
                Err(other) => return Err(other),
            }
        }
    };

    if contact.phone != canonical {
        match contacts::update_contact_phone(db, &contact.id, &canonical).await {
            Ok(()) => contact.phone = canonical.clone(),
            Err(e) => warn!(contact = contact.id.as_str(), error = %e, "phone renormalization failed"),
        }
    }
    if let Some(new_name) = name.map(str::trim).filter(|n| !n.is_empty()) {
        if contact.name.as_deref().map(str::trim) != Some(new_name) {
            match contacts::update_contact_name(db, &contact.id, new_name).await {
                Ok(()) => contact.name = Some(new_name.to_string()),
                Err(e) => warn!(contact = contact.id.as_str(), error = %e, "name update failed"),
            }
        }
    }

    Ok(contact)
}

/// Resolves the session for a `(contact, flow)` pair, creating it when
/// absent and resetting it when it previously reached a terminal state.
/// Paused sessions are returned as-is; the executor resumes them.
pub async fn ensure_active_session_for_flow(
    db: &Database,
    contact_id: &str,
    flow_id: &str,
) -> Result<Session, CascadaError> {
    let existing = sessions::find_session_by_contact_and_flow(db, contact_id, flow_id).await?;
    let session = match existing {
        Some(session) => session,
        None => {
            let candidate = Session {
                id: uuid::Uuid::new_v4().to_string(),
                contact_id: contact_id.to_string(),
                flow_id: flow_id.to_string(),
                status: SessionStatus::Active,
                current_node_id: None,
                context: "{}".to_string(),
                created_at: now_iso(),
                updated_at: now_iso(),
            };
            match sessions::create_session(db, &candidate).await {
                Ok(()) => return Ok(candidate),
                Err(CascadaError::Conflict(_)) => {
                    debug!(contact_id, flow_id, "session insert raced, re-reading");
                    sessions::find_session_by_contact_and_flow(db, contact_id, flow_id)
                        .await?
                        .ok_or_else(|| {
                            CascadaError::Conflict(
                                "session insert raced and re-read found nothing".into(),
                            )
                        })?
                }
                Err(other) => return Err(other),
            }
        }
    };

    if matches!(
        session.status,
        SessionStatus::Completed | SessionStatus::Errored
    ) {
        sessions::reset_session(db, &session.id).await?;
        return Ok(Session {
            status: SessionStatus::Active,
            current_node_id: None,
            context: "{}".to_string(),
            ..session
        });
    }
    Ok(session)
}

/// Prefers an existing open (Active/Paused) WhatsApp session for the
/// contact, most recently updated first. Sessions whose flow is no
/// longer active are skipped so routing falls back to trigger matching.
pub async fn find_resumable_session(
    db: &Database,
    contact: &Contact,
) -> Result<Option<(Session, Flow)>, CascadaError> {
    let open = sessions::find_open_sessions_for_contact(db, &contact.id).await?;
    for session in open {
        let Some(flow) = flows::get_flow(db, &session.flow_id).await? else {
            continue;
        };
        if flow.status != FlowStatus::Active {
            debug!(
                session = session.id.as_str(),
                flow = flow.id.as_str(),
                "open session's flow is inactive, skipping"
            );
            continue;
        }
        return Ok(Some((session, flow)));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascada_core::types::User;
    use cascada_storage::queries::users;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        users::create_user(
            &db,
            &User {
                id: "u1".to_string(),
                access_token: "tok".to_string(),
                business_account_id: "waba".to_string(),
                phone_number_id: "pn-1".to_string(),
                verify_token: None,
                created_at: now_iso(),
                updated_at: now_iso(),
            },
        )
        .await
        .unwrap();
        (db, dir)
    }

    fn active_flow(id: &str) -> Flow {
        Flow {
            id: id.to_string(),
            user_id: "u1".to_string(),
            name: id.to_string(),
            trigger: "hola".to_string(),
            status: FlowStatus::Active,
            channel: "whatsapp".to_string(),
            definition: r#"{"nodes":[],"edges":[]}"#.to_string(),
            meta_flow_id: None,
            meta_flow_token: None,
            meta_flow_version: None,
            created_at: now_iso(),
            updated_at: now_iso(),
        }
    }

    #[tokio::test]
    async fn creates_contact_with_canonical_phone() {
        let (db, _dir) = setup_db().await;
        let contact =
            get_or_create_contact(&db, "u1", "+54 9 11 2222-3333", Some("Ana"), &[])
                .await
                .unwrap();
        assert_eq!(contact.phone, "5491122223333");
        assert_eq!(contact.name.as_deref(), Some("Ana"));

        // A second resolution with a differently formatted phone finds
        // the same contact.
        let again = get_or_create_contact(&db, "u1", "5491122223333", None, &[])
            .await
            .unwrap();
        assert_eq!(again.id, contact.id);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn rejects_digitless_phone() {
        let (db, _dir) = setup_db().await;
        let err = get_or_create_contact(&db, "u1", "no digits", None, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, CascadaError::Validation(_)));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn renormalizes_stored_phone_and_updates_name() {
        let (db, _dir) = setup_db().await;
        // Seed a contact stored under a raw, non-canonical phone.
        contacts::create_contact(
            &db,
            &Contact {
                id: "c-raw".to_string(),
                user_id: "u1".to_string(),
                phone: "+54911".to_string(),
                name: Some("Old".to_string()),
                created_at: now_iso(),
                updated_at: now_iso(),
            },
        )
        .await
        .unwrap();

        let contact = get_or_create_contact(&db, "u1", "+54911", Some("New"), &[])
            .await
            .unwrap();
        assert_eq!(contact.id, "c-raw");
        assert_eq!(contact.phone, "54911");
        assert_eq!(contact.name.as_deref(), Some("New"));

        let stored = contacts::get_contact(&db, "c-raw").await.unwrap().unwrap();
        assert_eq!(stored.phone, "54911");
        assert_eq!(stored.name.as_deref(), Some("New"));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn finds_contact_via_alternate_phones() {
        let (db, _dir) = setup_db().await;
        let first = get_or_create_contact(&db, "u1", "111222333", None, &[])
            .await
            .unwrap();
        let found = get_or_create_contact(
            &db,
            "u1",
            "999",
            None,
            &["111 222 333".to_string()],
        )
        .await
        .unwrap();
        // The alternate matched the existing contact before any insert.
        assert_eq!(found.id, first.id);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn session_reset_on_terminal_states() {
        let (db, _dir) = setup_db().await;
        flows::create_flow(&db, &active_flow("f1")).await.unwrap();
        let contact = get_or_create_contact(&db, "u1", "111", None, &[]).await.unwrap();

        let session = ensure_active_session_for_flow(&db, &contact.id, "f1")
            .await
            .unwrap();
        sessions::update_session_state(
            &db,
            &session.id,
            SessionStatus::Completed,
            None,
            r#"{"endReason":"end"}"#,
        )
        .await
        .unwrap();

        let reset = ensure_active_session_for_flow(&db, &contact.id, "f1")
            .await
            .unwrap();
        assert_eq!(reset.id, session.id);
        assert_eq!(reset.status, SessionStatus::Active);
        assert_eq!(reset.context, "{}");
        assert!(reset.current_node_id.is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn paused_sessions_are_returned_as_is() {
        let (db, _dir) = setup_db().await;
        flows::create_flow(&db, &active_flow("f1")).await.unwrap();
        let contact = get_or_create_contact(&db, "u1", "111", None, &[]).await.unwrap();
        let session = ensure_active_session_for_flow(&db, &contact.id, "f1")
            .await
            .unwrap();
        sessions::update_session_state(
            &db,
            &session.id,
            SessionStatus::Paused,
            Some("options-1"),
            "{}",
        )
        .await
        .unwrap();

        let resumed = ensure_active_session_for_flow(&db, &contact.id, "f1")
            .await
            .unwrap();
        assert_eq!(resumed.status, SessionStatus::Paused);
        assert_eq!(resumed.current_node_id.as_deref(), Some("options-1"));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn resumable_session_skips_inactive_flows() {
        let (db, _dir) = setup_db().await;
        flows::create_flow(&db, &active_flow("f1")).await.unwrap();
        let contact = get_or_create_contact(&db, "u1", "111", None, &[]).await.unwrap();
        ensure_active_session_for_flow(&db, &contact.id, "f1")
            .await
            .unwrap();

        let found = find_resumable_session(&db, &contact).await.unwrap();
        assert!(found.is_some());

        flows::update_flow_status(&db, "f1", FlowStatus::Paused)
            .await
            .unwrap();
        let found = find_resumable_session(&db, &contact).await.unwrap();
        assert!(found.is_none());
        db.close().await.unwrap();
    }
}
