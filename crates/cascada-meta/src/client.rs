// SPDX-FileCopyrightText: 2026 Cascada Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Meta Graph API.
//!
//! Provides [`MetaClient`] which handles request construction,
//! authentication, the 15-second per-request deadline, error-message
//! extraction, access-token-expiry classification, and allow-list
//! auto-enrollment on recipient-not-allowed failures.

use std::time::Duration;

use cascada_core::CascadaError;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::payload::{build_payload, canonical_phone, OutboundMessage};

/// Base URL for the Meta Graph API, pinned to v23.0.
const GRAPH_API_BASE_URL: &str = "https://graph.facebook.com/v23.0";

/// Every Graph request is cancelled after this deadline.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Meta error code for a recipient missing from the allow list.
const RECIPIENT_NOT_ALLOWED_CODE: i64 = 131030;

/// The distinguished message surfaced when the access token is expired,
/// inviting the tenant to reconnect.
pub const TOKEN_EXPIRED_MESSAGE: &str =
    "Meta access token has expired. Reconnect your WhatsApp account to continue sending.";

/// Per-tenant credentials for one Graph call.
#[derive(Debug, Clone)]
pub struct MetaCredentials {
    pub access_token: String,
    pub phone_number_id: String,
}

/// A successful send: the Meta message id (first of `messages[]`) and
/// the conversation id when Meta reports one.
#[derive(Debug, Clone, Default)]
pub struct SendOutcome {
    pub message_id: Option<String>,
    pub conversation_id: Option<String>,
}

/// HTTP client for Graph API communication. Cheap to clone; the inner
/// reqwest client pools connections.
#[derive(Debug, Clone)]
pub struct MetaClient {
    client: reqwest::Client,
    base_url: String,
}

impl MetaClient {
    /// Creates a client with the production base URL and the standard
    /// deadline.
    pub fn new() -> Result<Self, CascadaError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CascadaError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: GRAPH_API_BASE_URL.to_string(),
        })
    }

    /// Overrides the base URL (tests and local mocks).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Sends a message to `to` on behalf of the tenant.
    ///
    /// The recipient phone is canonicalized to digits; an empty result
    /// fails with status 400 without contacting Meta. On a
    /// recipient-not-allowed error the client enrolls the number in the
    /// allow list and retries the send exactly once.
    pub async fn send_message(
        &self,
        creds: &MetaCredentials,
        to: &str,
        message: &OutboundMessage,
    ) -> Result<SendOutcome, CascadaError> {
        let to = canonical_phone(to);
        if to.is_empty() {
            return Err(CascadaError::Send {
                status: 400,
                message: "recipient phone must contain digits".into(),
                details: None,
            });
        }
        let payload = build_payload(&to, message)?;
        let url = format!("{}/{}/messages", self.base_url, creds.phone_number_id);

        let mut allow_list_attempted = false;
        loop {
            let response = self
                .client
                .post(&url)
                .bearer_auth(&creds.access_token)
                .json(&payload)
                .send()
                .await
                .map_err(transport_error)?;

            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            debug!(status = %status, to = to.as_str(), "graph send response");

            if status.is_success() {
                return Ok(parse_send_outcome(&body));
            }

            let details: Option<Value> = serde_json::from_str(&body).ok();
            let error_code = details
                .as_ref()
                .and_then(|d| d.get("error"))
                .and_then(|e| e.get("code"))
                .and_then(Value::as_i64);

            if status.as_u16() == 400
                && error_code == Some(RECIPIENT_NOT_ALLOWED_CODE)
                && !allow_list_attempted
            {
                warn!(to = to.as_str(), "recipient not in allow list, enrolling");
                self.enroll_recipient(creds, &to).await?;
                allow_list_attempted = true;
                continue;
            }

            let message = extract_error_message(status, details.as_ref(), &body);
            let message = if is_token_expired(status.as_u16(), &message) {
                TOKEN_EXPIRED_MESSAGE.to_string()
            } else {
                message
            };
            return Err(CascadaError::Send {
                status: status.as_u16(),
                message,
                details,
            });
        }
    }

    /// Enrolls a phone number in the tenant's allow list, falling back
    /// to the legacy endpoint when the Graph version does not expose
    /// `/recipients`.
    async fn enroll_recipient(
        &self,
        creds: &MetaCredentials,
        to: &str,
    ) -> Result<(), CascadaError> {
        let body = json!({"messaging_product": "whatsapp", "to": to});

        let first = self
            .post_allow_list(creds, "recipients", &body)
            .await?;
        let (status, text) = match first {
            None => return Ok(()),
            Some(failure) => failure,
        };

        let lowered = text.to_lowercase();
        let unknown_path = matches!(status, 400 | 404)
            && (lowered.contains("unknown path components")
                || lowered.contains("unsupported post request"));
        if unknown_path {
            debug!("allow-list endpoint missing, falling back to registered_whatsapp_users");
            match self
                .post_allow_list(creds, "registered_whatsapp_users", &body)
                .await?
            {
                None => return Ok(()),
                Some((status, text)) => {
                    return Err(enrollment_error(status, &text));
                }
            }
        }

        Err(enrollment_error(status, &text))
    }

    /// One allow-list POST. `Ok(None)` on success, `Ok(Some((status,
    /// body)))` on an HTTP-level rejection.
    async fn post_allow_list(
        &self,
        creds: &MetaCredentials,
        endpoint: &str,
        body: &Value,
    ) -> Result<Option<(u16, String)>, CascadaError> {
        let url = format!("{}/{}/{}", self.base_url, creds.phone_number_id, endpoint);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&creds.access_token)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(None);
        }
        let text = response.text().await.unwrap_or_default();
        Ok(Some((status.as_u16(), text)))
    }
}

fn transport_error(e: reqwest::Error) -> CascadaError {
    if e.is_timeout() {
        CascadaError::Send {
            status: 504,
            message: "Meta request timed out after 15s".into(),
            details: None,
        }
    } else {
        CascadaError::Send {
            status: 502,
            message: format!("Meta request failed: {e}"),
            details: None,
        }
    }
}

fn enrollment_error(status: u16, body: &str) -> CascadaError {
    let details: Option<Value> = serde_json::from_str(body).ok();
    let reason = details
        .as_ref()
        .and_then(|d| d.get("error"))
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .unwrap_or(body)
        .to_string();
    CascadaError::Send {
        status,
        message: format!(
            "could not enroll recipient in the allow list: {reason} \
             (add the number manually in the Meta dashboard)"
        ),
        details,
    }
}

fn parse_send_outcome(body: &str) -> SendOutcome {
    let parsed: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(_) => return SendOutcome::default(),
    };
    SendOutcome {
        message_id: parsed
            .get("messages")
            .and_then(Value::as_array)
            .and_then(|m| m.first())
            .and_then(|m| m.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string),
        conversation_id: parsed
            .get("conversation")
            .and_then(|c| c.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

/// Extracts the most specific error message Meta offered:
/// `error.error_user_msg`, then `error.message`, then the HTTP status
/// phrase, then the raw body.
fn extract_error_message(
    status: reqwest::StatusCode,
    details: Option<&Value>,
    body: &str,
) -> String {
    if let Some(error) = details.and_then(|d| d.get("error")) {
        for key in ["error_user_msg", "message"] {
            if let Some(msg) = error.get(key).and_then(Value::as_str) {
                if !msg.is_empty() {
                    return msg.to_string();
                }
            }
        }
    }
    if let Some(reason) = status.canonical_reason() {
        return reason.to_string();
    }
    if !body.trim().is_empty() {
        return body.trim().to_string();
    }
    format!("Meta returned status {status}")
}

/// The token is considered expired on 401, or on 400/403 when the
/// message mentions the access token or an expired session.
fn is_token_expired(status: u16, message: &str) -> bool {
    if status == 401 {
        return true;
    }
    if status == 400 || status == 403 {
        let lowered = message.to_lowercase();
        return lowered.contains("access token") || lowered.contains("session has expired");
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn creds() -> MetaCredentials {
        MetaCredentials {
            access_token: "token-abc".into(),
            phone_number_id: "pn-1".into(),
        }
    }

    fn client(server: &MockServer) -> MetaClient {
        MetaClient::new().unwrap().with_base_url(server.uri())
    }

    fn text() -> OutboundMessage {
        OutboundMessage::Text {
            body: "hello".into(),
        }
    }

    fn ok_body() -> Value {
        json!({"messaging_product": "whatsapp", "messages": [{"id": "wamid.OK"}]})
    }

    #[tokio::test]
    async fn send_success_returns_message_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/pn-1/messages"))
            .and(header("authorization", "Bearer token-abc"))
            .and(body_partial_json(json!({"to": "5491122223333", "type": "text"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body()))
            .mount(&server)
            .await;

        let outcome = client(&server)
            .send_message(&creds(), "+54 9 11 2222 3333", &text())
            .await
            .unwrap();
        assert_eq!(outcome.message_id.as_deref(), Some("wamid.OK"));
        assert!(outcome.conversation_id.is_none());
    }

    #[tokio::test]
    async fn invalid_phone_fails_without_contacting_meta() {
        let server = MockServer::start().await;
        // No mocks mounted: any request would fail the test via 404.
        let err = client(&server)
            .send_message(&creds(), "no digits", &text())
            .await
            .unwrap_err();
        match err {
            CascadaError::Send { status, .. } => assert_eq!(status, 400),
            other => panic!("expected send error, got {other:?}"),
        }
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn allow_list_enrollment_retries_once() {
        let server = MockServer::start().await;
        let denied = json!({"error": {"message": "Recipient not in allowed list", "code": 131030}});

        Mock::given(method("POST"))
            .and(path("/pn-1/messages"))
            .respond_with(ResponseTemplate::new(400).set_body_json(&denied))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/pn-1/recipients"))
            .and(body_partial_json(json!({"messaging_product": "whatsapp"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/pn-1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body()))
            .mount(&server)
            .await;

        let outcome = client(&server)
            .send_message(&creds(), "5491122223333", &text())
            .await
            .unwrap();
        assert_eq!(outcome.message_id.as_deref(), Some("wamid.OK"));
    }

    #[tokio::test]
    async fn enrollment_is_attempted_at_most_once() {
        let server = MockServer::start().await;
        let denied = json!({"error": {"message": "Recipient not in allowed list", "code": 131030}});

        // The send keeps failing with 131030 even after enrollment.
        Mock::given(method("POST"))
            .and(path("/pn-1/messages"))
            .respond_with(ResponseTemplate::new(400).set_body_json(&denied))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/pn-1/recipients"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server)
            .send_message(&creds(), "5491122223333", &text())
            .await
            .unwrap_err();
        match err {
            CascadaError::Send { status, .. } => assert_eq!(status, 400),
            other => panic!("expected send error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn enrollment_falls_back_to_legacy_endpoint() {
        let server = MockServer::start().await;
        let denied = json!({"error": {"message": "not allowed", "code": 131030}});

        Mock::given(method("POST"))
            .and(path("/pn-1/messages"))
            .respond_with(ResponseTemplate::new(400).set_body_json(&denied))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/pn-1/recipients"))
            .respond_with(ResponseTemplate::new(400).set_body_json(
                json!({"error": {"message": "Unknown path components: /recipients"}}),
            ))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/pn-1/registered_whatsapp_users"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/pn-1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body()))
            .mount(&server)
            .await;

        let outcome = client(&server)
            .send_message(&creds(), "5491122223333", &text())
            .await
            .unwrap();
        assert_eq!(outcome.message_id.as_deref(), Some("wamid.OK"));
    }

    #[tokio::test]
    async fn expired_token_gets_the_reconnect_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/pn-1/messages"))
            .respond_with(ResponseTemplate::new(401).set_body_json(
                json!({"error": {"message": "Invalid OAuth access token"}}),
            ))
            .mount(&server)
            .await;

        let err = client(&server)
            .send_message(&creds(), "549", &text())
            .await
            .unwrap_err();
        match err {
            CascadaError::Send { status, message, .. } => {
                assert_eq!(status, 401);
                assert_eq!(message, TOKEN_EXPIRED_MESSAGE);
            }
            other => panic!("expected send error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn session_expired_400_is_classified_as_token_expiry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/pn-1/messages"))
            .respond_with(ResponseTemplate::new(400).set_body_json(
                json!({"error": {"message": "Error validating access token: session has expired"}}),
            ))
            .mount(&server)
            .await;

        let err = client(&server)
            .send_message(&creds(), "549", &text())
            .await
            .unwrap_err();
        match err {
            CascadaError::Send { message, .. } => assert_eq!(message, TOKEN_EXPIRED_MESSAGE),
            other => panic!("expected send error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn error_user_msg_is_preferred() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/pn-1/messages"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {
                    "message": "(#131009) Parameter value is not valid",
                    "error_user_msg": "The body text is too long."
                }
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .send_message(&creds(), "549", &text())
            .await
            .unwrap_err();
        match err {
            CascadaError::Send { message, details, .. } => {
                assert_eq!(message, "The body text is too long.");
                assert!(details.is_some());
            }
            other => panic!("expected send error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn conversation_id_is_captured_when_present() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/pn-1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messages": [{"id": "wamid.1"}],
                "conversation": {"id": "conv-7"}
            })))
            .mount(&server)
            .await;

        let outcome = client(&server)
            .send_message(&creds(), "549", &text())
            .await
            .unwrap();
        assert_eq!(outcome.conversation_id.as_deref(), Some("conv-7"));
    }
}
