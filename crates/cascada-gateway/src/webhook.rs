// SPDX-FileCopyrightText: 2026 Cascada Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Meta webhook verification and event dispatch.
//!
//! The POST handler accepts both payload shapes Meta sends: the batched
//! `entry[].changes[].value` envelope and the standalone
//! `{field?, value}` form. Change values fan out per tenant; statuses
//! go to broadcast reconciliation, messages to the engine. One
//! message's failure never stops its siblings, and the endpoint
//! acknowledges with 200 even when no work was done.

use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use cascada_core::CascadaError;
use cascada_storage::queries::users;
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use crate::server::GatewayState;

/// GET /meta/webhook
///
/// The Meta verification handshake: echoes `hub.challenge` when
/// `hub.verify_token` matches the configured token.
pub async fn verify_webhook(
    State(state): State<GatewayState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let token = params.get("hub.verify_token");
    let challenge = params.get("hub.challenge");
    match (token, challenge) {
        (Some(token), Some(challenge)) => {
            if state.verify_token.as_deref() == Some(token.as_str()) {
                (StatusCode::OK, challenge.clone()).into_response()
            } else {
                warn!("webhook verification failed: token mismatch");
                StatusCode::FORBIDDEN.into_response()
            }
        }
        _ => StatusCode::BAD_REQUEST.into_response(),
    }
}

/// POST /meta/webhook
pub async fn receive_webhook(
    State(state): State<GatewayState>,
    Json(payload): Json<Value>,
) -> Response {
    let changes = extract_change_values(&payload);
    debug!(count = changes.len(), "webhook change values received");
    for value in &changes {
        if let Err(err) = process_change_value(&state, value).await {
            // The event is acknowledged regardless; Meta retries are
            // not useful for tenant-side failures.
            error!(error = %err, "change value processing failed");
        }
    }
    (StatusCode::OK, Json(json!({"status": "received"}))).into_response()
}

/// Collects change values from either webhook payload shape.
pub fn extract_change_values(payload: &Value) -> Vec<Value> {
    if let Some(entries) = payload.get("entry").and_then(Value::as_array) {
        let mut values = Vec::new();
        for entry in entries {
            if let Some(changes) = entry.get("changes").and_then(Value::as_array) {
                for change in changes {
                    if let Some(value) = change.get("value").filter(|v| v.is_object()) {
                        values.push(value.clone());
                    }
                }
            }
        }
        return values;
    }
    if let Some(value) = payload.get("value").filter(|v| v.is_object()) {
        return vec![value.clone()];
    }
    Vec::new()
}

/// Processes one change value: tenant resolution, then statuses and
/// messages.
async fn process_change_value(state: &GatewayState, value: &Value) -> Result<(), CascadaError> {
    let Some(phone_number_id) = value
        .get("metadata")
        .and_then(|m| m.get("phone_number_id"))
        .and_then(Value::as_str)
    else {
        debug!("change value without a phone_number_id, skipping");
        return Ok(());
    };

    let Some(user) =
        users::find_user_by_phone_number_id(state.engine.db(), phone_number_id).await?
    else {
        warn!(phone_number_id, "webhook for an unknown phone number id");
        return Ok(());
    };

    if let Some(statuses) = value.get("statuses").and_then(Value::as_array) {
        if !statuses.is_empty() {
            state.engine.reconcile_statuses(&user, statuses).await;
        }
    }

    if let Some(messages) = value.get("messages").and_then(Value::as_array) {
        if !messages.is_empty() {
            let profiles = index_profile_names(value);
            for message in messages {
                if let Err(err) = state
                    .engine
                    .handle_webhook_message(&user, message, &profiles)
                    .await
                {
                    error!(error = %err, "message processing failed, continuing with siblings");
                }
            }
        }
    }

    Ok(())
}

/// Indexes `contacts[]` by `wa_id` for profile-name lookup.
fn index_profile_names(value: &Value) -> HashMap<String, String> {
    let mut profiles = HashMap::new();
    if let Some(contacts) = value.get("contacts").and_then(Value::as_array) {
        for contact in contacts {
            let wa_id = contact.get("wa_id").and_then(Value::as_str);
            let name = contact
                .get("profile")
                .and_then(|p| p.get("name"))
                .and_then(Value::as_str);
            if let (Some(wa_id), Some(name)) = (wa_id, name) {
                profiles.insert(wa_id.to_string(), name.to_string());
            }
        }
    }
    profiles
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use cascada_core::types::{now_iso, Flow, FlowStatus, SessionStatus, User};
    use cascada_engine::Engine;
    use cascada_meta::MetaClient;
    use cascada_storage::queries::{contacts, flows, sessions, users};
    use cascada_storage::Database;
    use tempfile::tempdir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn state_with_db() -> (GatewayState, MockServer, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        let server = MockServer::start().await;
        let meta = MetaClient::new().unwrap().with_base_url(server.uri());
        let engine = Engine::new(db, meta);
        let state = GatewayState {
            engine: Arc::new(engine),
            verify_token: Some("verify-secret".to_string()),
        };
        (state, server, dir)
    }

    fn query(pairs: &[(&str, &str)]) -> Query<HashMap<String, String>> {
        Query(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[tokio::test]
    async fn verification_echoes_challenge_on_match() {
        let (state, _server, _dir) = state_with_db().await;
        let response = verify_webhook(
            State(state),
            query(&[
                ("hub.mode", "subscribe"),
                ("hub.verify_token", "verify-secret"),
                ("hub.challenge", "12345"),
            ]),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], &b"12345"[..]);
    }

    #[tokio::test]
    async fn verification_rejects_bad_token_and_missing_params() {
        let (state, _server, _dir) = state_with_db().await;
        let response = verify_webhook(
            State(state.clone()),
            query(&[("hub.verify_token", "wrong"), ("hub.challenge", "1")]),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = verify_webhook(State(state), query(&[("hub.mode", "subscribe")])).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn extracts_enveloped_change_values() {
        let payload = json!({
            "object": "whatsapp_business_account",
            "entry": [
                {"id": "e1", "changes": [
                    {"field": "messages", "value": {"metadata": {"phone_number_id": "pn-1"}}},
                    {"field": "messages", "value": {"metadata": {"phone_number_id": "pn-2"}}}
                ]},
                {"id": "e2", "changes": [{"field": "messages", "value": 42}]}
            ]
        });
        let values = extract_change_values(&payload);
        assert_eq!(values.len(), 2);
        assert_eq!(values[1]["metadata"]["phone_number_id"], "pn-2");
    }

    #[test]
    fn extracts_standalone_change_value() {
        let payload = json!({"field": "messages", "value": {"metadata": {}}});
        assert_eq!(extract_change_values(&payload).len(), 1);
        assert!(extract_change_values(&json!({"unrelated": true})).is_empty());
    }

    #[test]
    fn profile_names_index_by_wa_id() {
        let value = json!({"contacts": [
            {"wa_id": "549", "profile": {"name": "Ana"}},
            {"wa_id": "111"}
        ]});
        let profiles = index_profile_names(&value);
        assert_eq!(profiles.get("549").map(String::as_str), Some("Ana"));
        assert!(!profiles.contains_key("111"));
    }

    #[tokio::test]
    async fn webhook_message_drives_a_flow_end_to_end() {
        let (state, server, _dir) = state_with_db().await;
        let db = state.engine.db().clone();

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
        let definition = json!({
            "nodes": [
                {"id": "t1", "type": "trigger", "data": {"keyword": "hola"}},
                {"id": "m1", "type": "message",
                 "data": {"text": "Hi, {{context.lastUserMessage}}!"}},
                {"id": "e1", "type": "end"}
            ],
            "edges": [
                {"id": "ea", "source": "t1", "target": "m1"},
                {"id": "eb", "source": "m1", "target": "e1"}
            ]
        });
        flows::create_flow(
            &db,
            &Flow {
                id: "f1".to_string(),
                user_id: "u1".to_string(),
                name: "greeting".to_string(),
                trigger: "hola".to_string(),
                status: FlowStatus::Active,
                channel: "whatsapp".to_string(),
                definition: definition.to_string(),
                meta_flow_id: None,
                meta_flow_token: None,
                meta_flow_version: None,
                created_at: now_iso(),
                updated_at: now_iso(),
            },
        )
        .await
        .unwrap();

        Mock::given(method("POST"))
            .and(path("/pn-1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"messages": [{"id": "wamid.sent"}]}),
            ))
            .expect(1)
            .mount(&server)
            .await;

        let payload = json!({
            "object": "whatsapp_business_account",
            "entry": [{"id": "waba", "changes": [{"field": "messages", "value": {
                "metadata": {"phone_number_id": "pn-1"},
                "contacts": [{"wa_id": "5491122223333", "profile": {"name": "Ana"}}],
                "messages": [{
                    "from": "5491122223333",
                    "id": "wamid.in",
                    "type": "text",
                    "text": {"body": "Hola"}
                }]
            }}]}]
        });

        let response = receive_webhook(State(state), Json(payload)).await;
        assert_eq!(response.status(), StatusCode::OK);

        // Contact created with the profile name, session completed.
        let contact = contacts::find_contact_by_phones(&db, "u1", &["5491122223333".to_string()])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(contact.name.as_deref(), Some("Ana"));
        let session = sessions::find_session_by_contact_and_flow(&db, &contact.id, "f1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.status, SessionStatus::Completed);

        let sent: Value =
            serde_json::from_slice(&server.received_requests().await.unwrap()[0].body).unwrap();
        assert_eq!(sent["text"]["body"], "Hi, Hola!");
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn unknown_tenant_is_acknowledged_without_work() {
        let (state, _server, _dir) = state_with_db().await;
        let payload = json!({"value": {
            "metadata": {"phone_number_id": "pn-unknown"},
            "messages": [{"from": "1", "type": "text", "text": {"body": "x"}}]
        }});
        let response = receive_webhook(State(state), Json(payload)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
