// SPDX-FileCopyrightText: 2026 Cascada Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Flow-definition graph model and sanitizer.
//!
//! A flow definition is a `{nodes, edges}` graph. The sanitizer accepts
//! arbitrary JSON (an object or text) and returns the canonical shape
//! the executor interprets: every node carries a non-empty id, one of
//! the twelve known types, finite coordinates, and an object `data`
//! blob detached from the input. Unknown node properties are preserved
//! so definitions survive a round-trip without loss.
//!
//! Per-type `data` contracts are *not* enforced at sanitize time; each
//! node type has a typed record with a `parse` constructor that the
//! executor invokes right before interpreting the node. Illegal data
//! aborts the session with a validation error instead of advancing.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumString};

use crate::error::CascadaError;
use crate::types::MediaKind;

/// The twelve node types the interpreter understands.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Trigger,
    Message,
    Options,
    Delay,
    Condition,
    Api,
    Assign,
    Media,
    WhatsappFlow,
    Handoff,
    Goto,
    End,
}

/// Canvas coordinates. Purely presentational, but kept finite so the
/// definition round-trips cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// One typed step in a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Type-specific payload; always a JSON object after sanitizing.
    pub data: Value,
    pub position: Position,
    /// Unknown input properties, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A directed edge. `source_handle` carries dispatch information:
/// `true`/`false` for condition nodes, `opt-<i>`/`no-match` for options
/// nodes, unused elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(
        rename = "sourceHandle",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub source_handle: Option<String>,
    #[serde(
        rename = "targetHandle",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub target_handle: Option<String>,
}

/// The canonical node/edge graph.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FlowDefinition {
    pub nodes: Vec<FlowNode>,
    pub edges: Vec<Edge>,
}

impl FlowDefinition {
    /// Looks a node up by id.
    pub fn node(&self, id: &str) -> Option<&FlowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// All edges leaving the given node, in input order.
    pub fn outgoing<'a>(&'a self, node_id: &str) -> impl Iterator<Item = &'a Edge> + 'a {
        let node_id = node_id.to_string();
        self.edges.iter().filter(move |e| e.source == node_id)
    }

    /// The first edge leaving the given node, the default dispatch when
    /// a node does not name a successor itself.
    pub fn first_outgoing(&self, node_id: &str) -> Option<&Edge> {
        self.outgoing(node_id).next()
    }

    /// The edge leaving `node_id` whose source handle equals `handle`.
    pub fn outgoing_with_handle(&self, node_id: &str, handle: &str) -> Option<&Edge> {
        self.outgoing(node_id)
            .find(|e| e.source_handle.as_deref() == Some(handle))
    }

    /// All trigger nodes, in input order.
    pub fn trigger_nodes(&self) -> impl Iterator<Item = &FlowNode> {
        self.nodes
            .iter()
            .filter(|n| n.node_type == NodeType::Trigger)
    }
}

/// Parses and normalizes a flow definition from JSON text.
pub fn sanitize_str(input: &str) -> Result<FlowDefinition, CascadaError> {
    let value: Value = serde_json::from_str(input)
        .map_err(|e| CascadaError::validation(format!("flow definition is not valid JSON: {e}")))?;
    sanitize(&value)
}

/// Normalizes an arbitrary JSON value into a canonical [`FlowDefinition`].
///
/// Idempotent: sanitizing a sanitized definition yields an equal value.
pub fn sanitize(input: &Value) -> Result<FlowDefinition, CascadaError> {
    let obj = input
        .as_object()
        .ok_or_else(|| CascadaError::validation("flow definition must be a JSON object"))?;

    let mut nodes = Vec::new();
    if let Some(raw_nodes) = obj.get("nodes") {
        let arr = raw_nodes
            .as_array()
            .ok_or_else(|| CascadaError::validation("flow definition nodes must be an array"))?;
        for raw in arr {
            nodes.push(sanitize_node(raw)?);
        }
    }

    let mut edges = Vec::new();
    if let Some(raw_edges) = obj.get("edges") {
        let arr = raw_edges
            .as_array()
            .ok_or_else(|| CascadaError::validation("flow definition edges must be an array"))?;
        for raw in arr {
            edges.push(sanitize_edge(raw)?);
        }
    }

    Ok(FlowDefinition { nodes, edges })
}

fn sanitize_node(raw: &Value) -> Result<FlowNode, CascadaError> {
    let obj = raw
        .as_object()
        .ok_or_else(|| CascadaError::validation("node must be a JSON object"))?;

    let id = require_nonempty_str(obj, "id", "node")?;

    let type_str = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| CascadaError::validation(format!("node {id} is missing a type")))?;
    let node_type: NodeType = type_str
        .parse()
        .map_err(|_| CascadaError::validation(format!("node {id} has unknown type {type_str:?}")))?;

    let data = match obj.get("data") {
        Some(Value::Object(map)) => Value::Object(map.clone()),
        _ => Value::Object(Map::new()),
    };

    let position = match obj.get("position") {
        Some(Value::Object(pos)) => Position {
            x: finite_or_zero(pos.get("x")),
            y: finite_or_zero(pos.get("y")),
        },
        _ => Position::default(),
    };

    let mut extra = Map::new();
    for (key, value) in obj {
        if !matches!(key.as_str(), "id" | "type" | "data" | "position") {
            extra.insert(key.clone(), value.clone());
        }
    }

    Ok(FlowNode {
        id,
        node_type,
        data,
        position,
        extra,
    })
}

fn sanitize_edge(raw: &Value) -> Result<Edge, CascadaError> {
    let obj = raw
        .as_object()
        .ok_or_else(|| CascadaError::validation("edge must be a JSON object"))?;

    let id = require_nonempty_str(obj, "id", "edge")?;
    let source = require_nonempty_str(obj, "source", "edge")?;
    let target = require_nonempty_str(obj, "target", "edge")?;

    Ok(Edge {
        id,
        source,
        target,
        source_handle: handle_field(obj, "sourceHandle")?,
        target_handle: handle_field(obj, "targetHandle")?,
    })
}

fn require_nonempty_str(
    obj: &Map<String, Value>,
    key: &str,
    kind: &str,
) -> Result<String, CascadaError> {
    match obj.get(key).and_then(Value::as_str) {
        Some(s) if !s.is_empty() => Ok(s.to_string()),
        _ => Err(CascadaError::validation(format!(
            "{kind} is missing a non-empty {key}"
        ))),
    }
}

fn handle_field(obj: &Map<String, Value>, key: &str) -> Result<Option<String>, CascadaError> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(CascadaError::validation(format!(
            "edge {key} must be a string or null"
        ))),
    }
}

fn finite_or_zero(value: Option<&Value>) -> f64 {
    value
        .and_then(Value::as_f64)
        .filter(|n| n.is_finite())
        .unwrap_or(0.0)
}

// --- Per-type node data contracts ---
//
// Parsed from a node's `data` object right before the node is
// interpreted. Length limits count characters, not bytes.

fn data_str<'a>(data: &'a Value, key: &str) -> Option<&'a str> {
    data.get(key).and_then(Value::as_str)
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn check_len(
    value: &str,
    min: usize,
    max: usize,
    what: &str,
) -> Result<(), CascadaError> {
    let len = char_len(value);
    if len < min || len > max {
        return Err(CascadaError::validation(format!(
            "{what} must be {min}-{max} characters (got {len})"
        )));
    }
    Ok(())
}

fn check_opt_max(
    value: &Option<String>,
    max: usize,
    what: &str,
) -> Result<(), CascadaError> {
    if let Some(v) = value {
        if char_len(v) > max {
            return Err(CascadaError::validation(format!(
                "{what} must be at most {max} characters"
            )));
        }
    }
    Ok(())
}

/// Data for a `trigger` node.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerData {
    pub keyword: String,
}

impl TriggerData {
    pub fn parse(data: &Value) -> Result<Self, CascadaError> {
        let keyword = data_str(data, "keyword").unwrap_or_default().to_string();
        check_len(&keyword, 1, 64, "trigger keyword")?;
        Ok(Self { keyword })
    }
}

/// One template parameter carried by a template-mode message node.
/// Plain string entries are shorthand for a body text parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateParameterSpec {
    /// Component type (`body`, `header`, `button`, ...).
    pub component: String,
    /// Component sub-type (e.g. `quick_reply`), when one applies.
    pub sub_type: Option<String>,
    /// Component index, for indexed components such as buttons.
    pub index: Option<f64>,
    /// The raw parameter value; interpolated before dispatch.
    pub value: String,
}

/// Data for a `message` node: either a pre-approved template or free
/// text.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageData {
    Template {
        name: String,
        language: String,
        parameters: Vec<TemplateParameterSpec>,
    },
    Text {
        text: String,
    },
}

impl MessageData {
    pub fn parse(data: &Value) -> Result<Self, CascadaError> {
        let use_template = data
            .get("useTemplate")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        if use_template {
            let name = data_str(data, "templateName").unwrap_or_default().to_string();
            let language = data_str(data, "templateLanguage")
                .unwrap_or_default()
                .to_string();
            if name.is_empty() || language.is_empty() {
                return Err(CascadaError::validation(
                    "template message requires templateName and templateLanguage",
                ));
            }
            let parameters = match data.get("templateParameters") {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Array(items)) => items
                    .iter()
                    .map(parse_template_parameter)
                    .collect::<Result<Vec<_>, _>>()?,
                Some(_) => {
                    return Err(CascadaError::validation(
                        "templateParameters must be an array",
                    ))
                }
            };
            Ok(Self::Template {
                name,
                language,
                parameters,
            })
        } else {
            let text = data_str(data, "text").unwrap_or_default().to_string();
            check_len(&text, 1, 4096, "message text")?;
            Ok(Self::Text { text })
        }
    }
}

fn parse_template_parameter(raw: &Value) -> Result<TemplateParameterSpec, CascadaError> {
    match raw {
        Value::String(s) => Ok(TemplateParameterSpec {
            component: "body".to_string(),
            sub_type: None,
            index: None,
            value: s.clone(),
        }),
        Value::Object(obj) => {
            let value = obj
                .get("value")
                .or_else(|| obj.get("text"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Ok(TemplateParameterSpec {
                component: obj
                    .get("type")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .unwrap_or("body")
                    .to_string(),
                sub_type: obj
                    .get("subType")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                index: obj.get("index").and_then(Value::as_f64),
                value,
            })
        }
        _ => Err(CascadaError::validation(
            "template parameter must be a string or object",
        )),
    }
}

/// Data for an `options` node: a prompt plus 2-10 reply buttons.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionsData {
    pub text: String,
    pub options: Vec<String>,
}

impl OptionsData {
    pub fn parse(data: &Value) -> Result<Self, CascadaError> {
        let options: Vec<String> = match data.get("options") {
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| {
                    v.as_str().map(str::to_string).ok_or_else(|| {
                        CascadaError::validation("options entries must be strings")
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            _ => Vec::new(),
        };
        if options.len() < 2 || options.len() > 10 {
            return Err(CascadaError::validation(format!(
                "options node needs 2-10 options (got {})",
                options.len()
            )));
        }
        for option in &options {
            check_len(option, 1, 30, "option label")?;
        }
        Ok(Self {
            text: data_str(data, "text").unwrap_or_default().to_string(),
            options,
        })
    }
}

/// Data for a `delay` node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayData {
    pub seconds: u64,
}

impl DelayData {
    pub fn parse(data: &Value) -> Result<Self, CascadaError> {
        let seconds = data
            .get("seconds")
            .and_then(Value::as_f64)
            .filter(|n| n.is_finite())
            .ok_or_else(|| CascadaError::validation("delay seconds must be a number"))?;
        if !(1.0..=3600.0).contains(&seconds) {
            return Err(CascadaError::validation(
                "delay seconds must be between 1 and 3600",
            ));
        }
        Ok(Self {
            seconds: seconds as u64,
        })
    }
}

/// Data for a `condition` node.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionData {
    pub expression: String,
}

impl ConditionData {
    pub fn parse(data: &Value) -> Result<Self, CascadaError> {
        let expression = data_str(data, "expression").unwrap_or_default().to_string();
        check_len(&expression, 1, 500, "condition expression")?;
        Ok(Self { expression })
    }
}

/// HTTP methods allowed for `api` nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum ApiMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

/// Data for an `api` node.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiData {
    pub url: String,
    pub method: ApiMethod,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub assign_to: String,
}

impl ApiData {
    pub fn parse(data: &Value) -> Result<Self, CascadaError> {
        let url_str = data_str(data, "url").unwrap_or_default().to_string();
        url::Url::parse(&url_str)
            .map_err(|e| CascadaError::validation(format!("api url is invalid: {e}")))?;

        let method = data_str(data, "method")
            .unwrap_or("GET")
            .parse::<ApiMethod>()
            .map_err(|_| CascadaError::validation("api method must be GET, POST, PUT, PATCH, or DELETE"))?;

        let mut headers = Vec::new();
        match data.get("headers") {
            None | Some(Value::Null) => {}
            Some(Value::Object(map)) => {
                for (key, value) in map {
                    let value = value.as_str().ok_or_else(|| {
                        CascadaError::validation("api header values must be strings")
                    })?;
                    headers.push((key.clone(), value.to_string()));
                }
            }
            Some(_) => return Err(CascadaError::validation("api headers must be an object")),
        }

        let assign_to = data_str(data, "assignTo")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or("apiResult")
            .to_string();

        Ok(Self {
            url: url_str,
            method,
            headers,
            body: data_str(data, "body").unwrap_or_default().to_string(),
            assign_to,
        })
    }
}

/// Data for an `assign` node.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignData {
    pub key: String,
    pub value: String,
}

impl AssignData {
    pub fn parse(data: &Value) -> Result<Self, CascadaError> {
        let key = data_str(data, "key").unwrap_or_default().to_string();
        check_len(&key, 1, 50, "assign key")?;
        let value = data_str(data, "value").unwrap_or_default().to_string();
        if char_len(&value) > 500 {
            return Err(CascadaError::validation(
                "assign value must be at most 500 characters",
            ));
        }
        Ok(Self { key, value })
    }
}

/// Data for a `media` node. Must carry either an uploaded-media id or a
/// fetchable URL.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaData {
    pub media_type: MediaKind,
    pub url: Option<String>,
    pub id: Option<String>,
    pub caption: Option<String>,
}

impl MediaData {
    pub fn parse(data: &Value) -> Result<Self, CascadaError> {
        let media_type = data_str(data, "mediaType")
            .unwrap_or_default()
            .parse::<MediaKind>()
            .map_err(|_| {
                CascadaError::validation("mediaType must be image, video, audio, or document")
            })?;

        let url = data_str(data, "url")
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let id = data_str(data, "id")
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        if let Some(u) = &url {
            url::Url::parse(u)
                .map_err(|e| CascadaError::validation(format!("media url is invalid: {e}")))?;
        }
        if url.is_none() && id.is_none() {
            return Err(CascadaError::validation(
                "media node needs either an id or a url",
            ));
        }

        Ok(Self {
            media_type,
            url,
            id,
            caption: data_str(data, "caption").map(str::to_string),
        })
    }
}

/// Data for a `whatsapp_flow` node.
#[derive(Debug, Clone, PartialEq)]
pub struct WhatsAppFlowData {
    pub body: String,
    pub header: Option<String>,
    pub footer: Option<String>,
    pub cta: Option<String>,
}

impl WhatsAppFlowData {
    pub fn parse(data: &Value) -> Result<Self, CascadaError> {
        let body = data_str(data, "body").unwrap_or_default().to_string();
        check_len(&body, 1, 1024, "whatsapp_flow body")?;
        let header = data_str(data, "header").map(str::to_string);
        let footer = data_str(data, "footer").map(str::to_string);
        let cta = data_str(data, "cta").map(str::to_string);
        check_opt_max(&header, 60, "whatsapp_flow header")?;
        check_opt_max(&footer, 60, "whatsapp_flow footer")?;
        check_opt_max(&cta, 40, "whatsapp_flow cta")?;
        Ok(Self {
            body,
            header,
            footer,
            cta,
        })
    }
}

/// Data for a `handoff` node.
#[derive(Debug, Clone, PartialEq)]
pub struct HandoffData {
    pub queue: String,
    pub note: Option<String>,
}

impl HandoffData {
    pub fn parse(data: &Value) -> Result<Self, CascadaError> {
        let queue = data_str(data, "queue").unwrap_or_default().to_string();
        if queue.is_empty() {
            return Err(CascadaError::validation("handoff queue must be non-empty"));
        }
        let note = data_str(data, "note").map(str::to_string);
        check_opt_max(&note, 500, "handoff note")?;
        Ok(Self { queue, note })
    }
}

/// Data for a `goto` node.
#[derive(Debug, Clone, PartialEq)]
pub struct GotoData {
    pub target_node_id: String,
}

impl GotoData {
    pub fn parse(data: &Value) -> Result<Self, CascadaError> {
        let target_node_id = data_str(data, "targetNodeId").unwrap_or_default().to_string();
        if target_node_id.is_empty() {
            return Err(CascadaError::validation(
                "goto targetNodeId must be non-empty",
            ));
        }
        Ok(Self { target_node_id })
    }
}

/// Data for an `end` node.
#[derive(Debug, Clone, PartialEq)]
pub struct EndData {
    pub reason: String,
}

impl EndData {
    pub fn parse(data: &Value) -> Result<Self, CascadaError> {
        let reason = data_str(data, "reason")
            .filter(|s| !s.is_empty())
            .unwrap_or("end")
            .to_string();
        Ok(Self { reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn graph() -> Value {
        json!({
            "nodes": [
                {
                    "id": "n1",
                    "type": "trigger",
                    "data": {"keyword": "hola"},
                    "position": {"x": 10.5, "y": -3},
                    "label": "start here"
                },
                {"id": "n2", "type": "message"}
            ],
            "edges": [
                {"id": "e1", "source": "n1", "target": "n2", "sourceHandle": null}
            ]
        })
    }

    #[test]
    fn sanitize_normalizes_defaults() {
        let def = sanitize(&graph()).unwrap();
        assert_eq!(def.nodes.len(), 2);
        assert_eq!(def.nodes[0].node_type, NodeType::Trigger);
        assert_eq!(def.nodes[0].position.x, 10.5);
        assert_eq!(def.nodes[0].position.y, -3.0);
        // Missing data and position default to empty object / origin.
        assert_eq!(def.nodes[1].data, json!({}));
        assert_eq!(def.nodes[1].position, Position::default());
        // Null handle normalizes to unset.
        assert_eq!(def.edges[0].source_handle, None);
    }

    #[test]
    fn sanitize_preserves_unknown_node_properties() {
        let def = sanitize(&graph()).unwrap();
        assert_eq!(def.nodes[0].extra.get("label"), Some(&json!("start here")));
    }

    #[test]
    fn sanitize_is_idempotent() {
        let once = sanitize(&graph()).unwrap();
        let serialized = serde_json::to_value(&once).unwrap();
        let twice = sanitize(&serialized).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn sanitize_detaches_data_from_input() {
        let mut input = graph();
        let def = sanitize(&input).unwrap();
        input["nodes"][0]["data"]["keyword"] = json!("changed");
        assert_eq!(def.nodes[0].data["keyword"], json!("hola"));
    }

    #[test]
    fn sanitize_rejects_bad_shapes() {
        assert!(sanitize(&json!([])).is_err());
        assert!(sanitize(&json!({"nodes": [{"id": "", "type": "end"}]})).is_err());
        assert!(sanitize(&json!({"nodes": [{"id": "x", "type": "teleport"}]})).is_err());
        assert!(sanitize(&json!({"edges": [{"id": "e", "source": "a"}]})).is_err());
        assert!(
            sanitize(&json!({"edges": [{"id": "e", "source": "a", "target": "b", "sourceHandle": 7}]}))
                .is_err()
        );
    }

    #[test]
    fn sanitize_zeroes_non_finite_positions() {
        let def = sanitize(&json!({
            "nodes": [{"id": "n", "type": "end", "position": {"x": "nope", "y": 4}}]
        }))
        .unwrap();
        assert_eq!(def.nodes[0].position, Position { x: 0.0, y: 4.0 });
    }

    #[test]
    fn sanitize_str_round_trips() {
        let text = serde_json::to_string(&graph()).unwrap();
        let def = sanitize_str(&text).unwrap();
        assert_eq!(def.nodes.len(), 2);
        assert!(sanitize_str("not json").is_err());
    }

    #[test]
    fn edge_lookup_helpers() {
        let def = sanitize(&json!({
            "nodes": [
                {"id": "c", "type": "condition"},
                {"id": "yes", "type": "end"},
                {"id": "no", "type": "end"}
            ],
            "edges": [
                {"id": "e1", "source": "c", "target": "yes", "sourceHandle": "true"},
                {"id": "e2", "source": "c", "target": "no", "sourceHandle": "false"}
            ]
        }))
        .unwrap();
        assert_eq!(def.outgoing_with_handle("c", "false").unwrap().target, "no");
        assert_eq!(def.first_outgoing("c").unwrap().target, "yes");
        assert!(def.first_outgoing("yes").is_none());
    }

    #[test]
    fn trigger_data_bounds() {
        assert!(TriggerData::parse(&json!({"keyword": "hola"})).is_ok());
        assert!(TriggerData::parse(&json!({"keyword": ""})).is_err());
        assert!(TriggerData::parse(&json!({"keyword": "x".repeat(65)})).is_err());
        assert!(TriggerData::parse(&json!({})).is_err());
    }

    #[test]
    fn message_data_text_mode() {
        let parsed = MessageData::parse(&json!({"text": "hello"})).unwrap();
        assert_eq!(parsed, MessageData::Text { text: "hello".into() });
        assert!(MessageData::parse(&json!({"text": ""})).is_err());
        assert!(MessageData::parse(&json!({"text": "x".repeat(4097)})).is_err());
    }

    #[test]
    fn message_data_template_mode() {
        let parsed = MessageData::parse(&json!({
            "useTemplate": true,
            "templateName": "welcome",
            "templateLanguage": "es",
            "templateParameters": ["{{name}}", {"type": "button", "subType": "quick_reply", "index": 0, "value": "go"}]
        }))
        .unwrap();
        match parsed {
            MessageData::Template { name, language, parameters } => {
                assert_eq!(name, "welcome");
                assert_eq!(language, "es");
                assert_eq!(parameters.len(), 2);
                assert_eq!(parameters[0].component, "body");
                assert_eq!(parameters[1].sub_type.as_deref(), Some("quick_reply"));
                assert_eq!(parameters[1].index, Some(0.0));
            }
            other => panic!("expected template, got {other:?}"),
        }
        assert!(MessageData::parse(&json!({"useTemplate": true, "templateName": "x"})).is_err());
    }

    #[test]
    fn options_data_bounds() {
        let long = "x".repeat(30);
        assert!(OptionsData::parse(&json!({"options": [long, "b"]})).is_ok());
        assert!(OptionsData::parse(&json!({"options": ["only"]})).is_err());
        assert!(OptionsData::parse(&json!({"options": ["a", "x".repeat(31)]})).is_err());
        assert!(OptionsData::parse(&json!({"options": (0..11).map(|i| i.to_string()).collect::<Vec<_>>()})).is_err());
    }

    #[test]
    fn delay_data_bounds() {
        assert_eq!(DelayData::parse(&json!({"seconds": 3600})).unwrap().seconds, 3600);
        assert!(DelayData::parse(&json!({"seconds": 0})).is_err());
        assert!(DelayData::parse(&json!({"seconds": 3601})).is_err());
        assert!(DelayData::parse(&json!({"seconds": "five"})).is_err());
    }

    #[test]
    fn api_data_defaults_and_validation() {
        let parsed = ApiData::parse(&json!({
            "url": "https://api.example.com/items",
            "method": "post",
            "headers": {"X-Auth": "{{token}}"},
            "body": "{\"q\": 1}"
        }))
        .unwrap();
        assert_eq!(parsed.method, ApiMethod::Post);
        assert_eq!(parsed.assign_to, "apiResult");
        assert_eq!(parsed.headers, vec![("X-Auth".into(), "{{token}}".into())]);

        assert!(ApiData::parse(&json!({"url": "not a url"})).is_err());
        assert!(ApiData::parse(&json!({"url": "https://x.dev", "method": "TRACE"})).is_err());
        assert!(ApiData::parse(&json!({"url": "https://x.dev", "headers": {"a": 1}})).is_err());
    }

    #[test]
    fn assign_data_bounds() {
        assert!(AssignData::parse(&json!({"key": "score", "value": "5"})).is_ok());
        assert!(AssignData::parse(&json!({"key": "", "value": "x"})).is_err());
        assert!(AssignData::parse(&json!({"key": "k", "value": "v".repeat(501)})).is_err());
    }

    #[test]
    fn media_data_needs_id_or_url() {
        assert!(MediaData::parse(&json!({"mediaType": "image", "url": "https://cdn.example.com/a.png"})).is_ok());
        assert!(MediaData::parse(&json!({"mediaType": "audio", "id": "media-1"})).is_ok());
        assert!(MediaData::parse(&json!({"mediaType": "image"})).is_err());
        assert!(MediaData::parse(&json!({"mediaType": "gif", "id": "x"})).is_err());
        assert!(MediaData::parse(&json!({"mediaType": "image", "url": "::"})).is_err());
    }

    #[test]
    fn whatsapp_flow_data_bounds() {
        assert!(WhatsAppFlowData::parse(&json!({"body": "Open the form"})).is_ok());
        assert!(WhatsAppFlowData::parse(&json!({"body": ""})).is_err());
        assert!(WhatsAppFlowData::parse(&json!({"body": "b", "header": "h".repeat(61)})).is_err());
        assert!(WhatsAppFlowData::parse(&json!({"body": "b", "cta": "c".repeat(41)})).is_err());
    }

    #[test]
    fn handoff_goto_end_data() {
        assert!(HandoffData::parse(&json!({"queue": "support"})).is_ok());
        assert!(HandoffData::parse(&json!({})).is_err());
        assert_eq!(
            GotoData::parse(&json!({"targetNodeId": "n9"})).unwrap().target_node_id,
            "n9"
        );
        assert!(GotoData::parse(&json!({})).is_err());
        assert_eq!(EndData::parse(&json!({})).unwrap().reason, "end");
        assert_eq!(EndData::parse(&json!({"reason": "done"})).unwrap().reason, "done");
    }
}
