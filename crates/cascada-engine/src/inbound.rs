// SPDX-FileCopyrightText: 2026 Cascada Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Normalized inbound events: the shape the executor consumes,
//! extracted from Meta webhook message objects.

use std::collections::HashMap;

use cascada_core::context::InboundRecord;
use serde_json::{json, Value};

/// One normalized inbound event: text plus optional interactive reply
/// fields and an opaque media blob.
#[derive(Debug, Clone, Default)]
pub struct InboundPayload {
    /// Sender wa_id / phone.
    pub from: String,
    /// Message body text (or media caption); empty for pure
    /// interactive replies.
    pub text: String,
    /// Interactive reply id (`button_reply`/`list_reply` id, or a
    /// template quick-reply payload).
    pub interactive_id: Option<String>,
    /// Interactive reply title.
    pub interactive_title: Option<String>,
    /// Opaque media blob, never schema-validated.
    pub media: Option<Value>,
    /// Profile name reported alongside the webhook contact entry.
    pub profile_name: Option<String>,
    /// Meta message id.
    pub message_id: Option<String>,
}

impl InboundPayload {
    /// Extracts a payload from a Meta webhook message object. Returns
    /// `None` when the message has no sender.
    pub fn from_meta_message(
        message: &Value,
        profile_names: &HashMap<String, String>,
    ) -> Option<Self> {
        let from = message.get("from").and_then(Value::as_str)?.to_string();
        let mut payload = InboundPayload {
            profile_name: profile_names.get(&from).cloned(),
            message_id: message
                .get("id")
                .and_then(Value::as_str)
                .map(str::to_string),
            from,
            ..Default::default()
        };

        let kind = message.get("type").and_then(Value::as_str).unwrap_or("");
        match kind {
            "text" => {
                payload.text = message
                    .get("text")
                    .and_then(|t| t.get("body"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
            }
            "interactive" => {
                let interactive = message.get("interactive");
                let reply = interactive
                    .and_then(|i| i.get("button_reply"))
                    .or_else(|| interactive.and_then(|i| i.get("list_reply")));
                if let Some(reply) = reply {
                    payload.interactive_id = reply
                        .get("id")
                        .and_then(Value::as_str)
                        .map(str::to_string);
                    payload.interactive_title = reply
                        .get("title")
                        .and_then(Value::as_str)
                        .map(str::to_string);
                }
            }
            "button" => {
                // Template quick replies arrive as a `button` object.
                let button = message.get("button");
                payload.text = button
                    .and_then(|b| b.get("text"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                payload.interactive_id = button
                    .and_then(|b| b.get("payload"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
            }
            "image" | "video" | "audio" | "document" | "sticker" => {
                if let Some(blob) = message.get(kind) {
                    payload.text = blob
                        .get("caption")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    let mut media = blob.clone();
                    if let Some(map) = media.as_object_mut() {
                        map.insert("mediaType".into(), json!(kind));
                    }
                    payload.media = Some(media);
                }
            }
            _ => {}
        }

        Some(payload)
    }

    /// The bookkeeping record folded into the session context.
    pub fn record(&self) -> InboundRecord {
        InboundRecord {
            text: self.text.clone(),
            interactive_id: self.interactive_id.clone(),
            interactive_title: self.interactive_title.clone(),
            media: self.media.clone(),
        }
    }
}
