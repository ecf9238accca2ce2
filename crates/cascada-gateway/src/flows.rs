// SPDX-FileCopyrightText: 2026 Cascada Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The manual trigger endpoint: `POST /flows/:flow_id/trigger`.
//!
//! Drives contact resolution and execution directly, bypassing webhook
//! dispatch and flow selection. Failures mirror the error's status onto
//! the HTTP response inside a `{success, error, status}` envelope.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use cascada_engine::ManualTrigger;
use serde_json::{json, Value};
use tracing::warn;

use crate::server::GatewayState;

/// POST /flows/:flow_id/trigger
pub async fn trigger_flow(
    State(state): State<GatewayState>,
    Path(flow_id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let request = match parse_trigger_request(&body) {
        Ok(request) => request,
        Err(message) => return failure(400, message),
    };

    match state.engine.trigger_flow(&flow_id, request).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "flowId": outcome.flow_id,
                "contactId": outcome.contact_id,
                "sessionId": outcome.session_id,
            })),
        )
            .into_response(),
        Err(err) => {
            warn!(flow_id = flow_id.as_str(), error = %err, "manual trigger failed");
            failure(err.http_status(), err.to_string())
        }
    }
}

fn failure(status: u16, error: String) -> Response {
    let code = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        code,
        Json(json!({"success": false, "error": error, "status": status})),
    )
        .into_response()
}

/// Validates the trigger body: `from` is a required non-empty string;
/// `message` and `name` must be strings when present; `variables` must
/// be an object; `incomingMeta` is an opaque record (or null) whose
/// `media` is carried through unvalidated.
fn parse_trigger_request(body: &Value) -> Result<ManualTrigger, String> {
    let obj = body
        .as_object()
        .ok_or_else(|| "request body must be a JSON object".to_string())?;

    let from = match obj.get("from") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        _ => return Err("from is required and must be a non-empty string".to_string()),
    };

    let message = match obj.get("message") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => return Err("message must be a string".to_string()),
    };

    let name = match obj.get("name") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => return Err("name must be a string".to_string()),
    };

    let variables = match obj.get("variables") {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) => Some(map.clone()),
        Some(_) => return Err("variables must be an object".to_string()),
    };

    let incoming_meta = match obj.get("incomingMeta") {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) => Some(Value::Object(map.clone())),
        Some(_) => return Err("incomingMeta must be an object or null".to_string()),
    };

    Ok(ManualTrigger {
        from,
        message,
        name,
        variables,
        incoming_meta,
    })
}
