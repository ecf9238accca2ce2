// SPDX-FileCopyrightText: 2026 Cascada Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound message variants and their Graph `/messages` payload
//! shapes.

use cascada_core::types::MediaKind;
use cascada_core::CascadaError;
use serde_json::{json, Map, Value};

/// Interactive button messages carry at most this many options; extra
/// entries are truncated.
pub const MAX_BUTTONS: usize = 3;

/// Reduces a phone number to its canonical digits-only form.
pub fn canonical_phone(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Derives a stable button id from an option label:
/// lowercased, trimmed, whitespace runs collapsed to `_`, and `"opt"`
/// when nothing remains.
pub fn button_id(option: &str) -> String {
    let id = option
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_");
    if id.is_empty() {
        "opt".to_string()
    } else {
        id
    }
}

/// One normalized template component: lowercased type and sub-type,
/// finite index, text-only parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateComponent {
    pub component_type: String,
    pub sub_type: Option<String>,
    pub index: Option<f64>,
    pub parameters: Vec<String>,
}

/// A flow-level send request, one variant per supported message shape.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    /// Plain text.
    Text { body: String },
    /// Media by uploaded id or fetchable link.
    Media {
        media_type: MediaKind,
        id: Option<String>,
        url: Option<String>,
        caption: Option<String>,
    },
    /// Interactive reply buttons (max [`MAX_BUTTONS`], truncated).
    Buttons { body: String, options: Vec<String> },
    /// Interactive list. Not reachable from the flow executor; kept for
    /// external callers.
    List {
        body: String,
        button: String,
        sections: Value,
    },
    /// WhatsApp Flow launcher.
    Flow {
        flow_id: String,
        flow_token: String,
        version: Option<String>,
        header: Option<String>,
        footer: Option<String>,
        cta: Option<String>,
        body: String,
    },
    /// Pre-approved template.
    Template {
        name: String,
        language: String,
        components: Vec<TemplateComponent>,
    },
}

fn send_error(message: impl Into<String>) -> CascadaError {
    CascadaError::Send {
        status: 400,
        message: message.into(),
        details: None,
    }
}

/// Builds the Graph `/messages` POST payload for a send request.
///
/// Local validation failures carry status 400 and never reach Meta.
pub fn build_payload(to: &str, message: &OutboundMessage) -> Result<Value, CascadaError> {
    let mut payload = Map::new();
    payload.insert("messaging_product".into(), json!("whatsapp"));
    payload.insert("to".into(), json!(to));

    match message {
        OutboundMessage::Text { body } => {
            payload.insert("type".into(), json!("text"));
            payload.insert(
                "text".into(),
                json!({"body": body, "preview_url": false}),
            );
        }
        OutboundMessage::Media {
            media_type,
            id,
            url,
            caption,
        } => {
            let mut media = Map::new();
            match (id, url) {
                (Some(id), _) if !id.is_empty() => {
                    media.insert("id".into(), json!(id));
                }
                (_, Some(url)) if !url.is_empty() => {
                    media.insert("link".into(), json!(url));
                }
                _ => return Err(send_error("media message needs an id or a url")),
            }
            if let Some(caption) = caption {
                if !caption.is_empty() {
                    media.insert("caption".into(), json!(caption));
                }
            }
            let kind = media_type.to_string();
            payload.insert("type".into(), json!(kind));
            payload.insert(kind, Value::Object(media));
        }
        OutboundMessage::Buttons { body, options } => {
            let buttons: Vec<Value> = options
                .iter()
                .take(MAX_BUTTONS)
                .map(|option| {
                    json!({
                        "type": "reply",
                        "reply": {"id": button_id(option), "title": option}
                    })
                })
                .collect();
            if buttons.is_empty() {
                return Err(send_error("buttons message needs at least one option"));
            }
            payload.insert("type".into(), json!("interactive"));
            payload.insert(
                "interactive".into(),
                json!({
                    "type": "button",
                    "body": {"text": body},
                    "action": {"buttons": buttons}
                }),
            );
        }
        OutboundMessage::List {
            body,
            button,
            sections,
        } => {
            payload.insert("type".into(), json!("interactive"));
            payload.insert(
                "interactive".into(),
                json!({
                    "type": "list",
                    "body": {"text": body},
                    "action": {"button": button, "sections": sections}
                }),
            );
        }
        OutboundMessage::Flow {
            flow_id,
            flow_token,
            version,
            header,
            footer,
            cta,
            body,
        } => {
            if flow_id.is_empty() || flow_token.is_empty() {
                return Err(send_error("flow message needs a Meta flow id and token"));
            }
            if body.is_empty() {
                return Err(send_error("flow message body must be non-empty"));
            }
            let mut interactive = Map::new();
            interactive.insert("type".into(), json!("flow"));
            if let Some(header) = header {
                if !header.is_empty() {
                    interactive.insert("header".into(), json!({"type": "text", "text": header}));
                }
            }
            interactive.insert("body".into(), json!({"text": body}));
            if let Some(footer) = footer {
                if !footer.is_empty() {
                    interactive.insert("footer".into(), json!({"text": footer}));
                }
            }
            let mut parameters = Map::new();
            parameters.insert(
                "flow_message_version".into(),
                json!(version.clone().unwrap_or_else(|| "3".to_string())),
            );
            parameters.insert("flow_id".into(), json!(flow_id));
            parameters.insert("flow_token".into(), json!(flow_token));
            if let Some(cta) = cta {
                if !cta.is_empty() {
                    parameters.insert("flow_cta".into(), json!(cta));
                }
            }
            interactive.insert(
                "action".into(),
                json!({"name": "flow", "parameters": parameters}),
            );
            payload.insert("type".into(), json!("interactive"));
            payload.insert("interactive".into(), Value::Object(interactive));
        }
        OutboundMessage::Template {
            name,
            language,
            components,
        } => {
            if name.is_empty() || language.is_empty() {
                return Err(send_error("template message needs a name and a language"));
            }
            let components: Vec<Value> = components
                .iter()
                .map(normalize_component)
                .collect();
            let mut template = Map::new();
            template.insert("name".into(), json!(name));
            template.insert("language".into(), json!({"code": language}));
            if !components.is_empty() {
                template.insert("components".into(), json!(components));
            }
            payload.insert("type".into(), json!("template"));
            payload.insert("template".into(), Value::Object(template));
        }
    }

    Ok(Value::Object(payload))
}

fn normalize_component(component: &TemplateComponent) -> Value {
    let mut out = Map::new();
    out.insert(
        "type".into(),
        json!(component.component_type.to_lowercase()),
    );
    if let Some(sub_type) = &component.sub_type {
        out.insert("sub_type".into(), json!(sub_type.to_lowercase()));
    }
    if let Some(index) = component.index.filter(|i| i.is_finite()) {
        out.insert("index".into(), json!(index as i64));
    }
    let parameters: Vec<Value> = component
        .parameters
        .iter()
        .map(|text| json!({"type": "text", "text": text}))
        .collect();
    out.insert("parameters".into(), json!(parameters));
    Value::Object(out)
}
