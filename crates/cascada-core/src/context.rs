// SPDX-FileCopyrightText: 2026 Cascada Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-session JSON context: an open bag of user-defined variables plus
//! the denormalized interaction bookkeeping the engine maintains.
//!
//! History sequences (`_meta.history` and `inputHistory`) are capped at
//! [`HISTORY_LIMIT`] entries with the oldest truncated first.

use serde_json::{json, Map, Value};

use crate::error::CascadaError;
use crate::types::now_iso;

/// Maximum entries retained in `_meta.history` and `inputHistory`.
pub const HISTORY_LIMIT: usize = 50;

/// Splits a dotted path into segments. Bracketed numeric indices are
/// accepted as segment syntax, so `items[0].name` and `items.0.name`
/// address the same value.
fn path_segments(path: &str) -> Vec<&str> {
    path.split(['.', '[', ']'])
        .filter(|s| !s.is_empty())
        .collect()
}

/// Resolves a dotted path inside a JSON tree. Maps are traversed by
/// key, arrays by integer index. Returns `None` when any hop is absent.
pub fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path_segments(path) {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Sets a value at a dotted path, creating intermediate maps as needed.
/// Existing non-container values along the way are replaced by maps;
/// array elements are written in place when the index already exists.
pub fn set_path(root: &mut Value, path: &str, value: Value) {
    let segments = path_segments(path);
    if segments.is_empty() {
        return;
    }
    let mut current = root;
    for segment in &segments[..segments.len() - 1] {
        current = descend(current, segment);
    }
    let last = segments[segments.len() - 1];
    match current {
        Value::Array(items) => {
            if let Ok(idx) = last.parse::<usize>() {
                if idx < items.len() {
                    items[idx] = value;
                }
            }
        }
        other => {
            if !matches!(other, Value::Object(_)) {
                *other = Value::Object(Map::new());
            }
            if let Value::Object(map) = other {
                map.insert(last.to_string(), value);
            }
        }
    }
}

/// One hop of a path walk: existing array slots are entered by index,
/// anything else becomes (or stays) a map with the segment as key.
fn descend<'a>(current: &'a mut Value, segment: &str) -> &'a mut Value {
    let index = match &*current {
        Value::Array(items) => segment
            .parse::<usize>()
            .ok()
            .filter(|i| *i < items.len()),
        _ => None,
    };
    if let Some(idx) = index {
        return &mut current[idx];
    }
    if !matches!(current, Value::Object(_)) {
        *current = Value::Object(Map::new());
    }
    match current {
        Value::Object(map) => map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new())),
        _ => unreachable!("object ensured above"),
    }
}

/// An inbound event about to be folded into the context bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct InboundRecord {
    /// Message text (empty for pure interactive replies).
    pub text: String,
    /// Interactive reply id, when the user tapped a button or list row.
    pub interactive_id: Option<String>,
    /// Interactive reply title.
    pub interactive_title: Option<String>,
    /// Opaque media blob, carried through unvalidated.
    pub media: Option<Value>,
}

/// The session's JSON bag with the engine's bookkeeping rules attached.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    root: Value,
}

impl SessionContext {
    /// An empty context.
    pub fn new() -> Self {
        Self {
            root: Value::Object(Map::new()),
        }
    }

    /// Parses a persisted context. Non-object JSON is rejected.
    pub fn from_json_str(input: &str) -> Result<Self, CascadaError> {
        if input.trim().is_empty() {
            return Ok(Self::new());
        }
        let root: Value = serde_json::from_str(input)
            .map_err(|e| CascadaError::Internal(format!("session context is not valid JSON: {e}")))?;
        if !root.is_object() {
            return Err(CascadaError::Internal(
                "session context must be a JSON object".into(),
            ));
        }
        Ok(Self { root })
    }

    /// Serializes the context for persistence.
    pub fn to_json_string(&self) -> String {
        self.root.to_string()
    }

    /// Read access to the underlying tree.
    pub fn get(&self, path: &str) -> Option<&Value> {
        lookup_path(&self.root, path)
    }

    /// Writes a value at a dotted path.
    pub fn set(&mut self, path: &str, value: Value) {
        set_path(&mut self.root, path, value);
    }

    /// The scope templates and condition expressions resolve against:
    /// the context's own entries plus a `context` alias of the whole
    /// bag, so both `{{name}}` and `{{context.name}}` address the same
    /// value.
    pub fn scope(&self) -> Value {
        let mut scope = self
            .root
            .as_object()
            .cloned()
            .unwrap_or_default();
        scope.insert("context".to_string(), self.root.clone());
        Value::Object(scope)
    }

    /// Folds an inbound event into the bookkeeping: appends history,
    /// refreshes the `lastUser*`/`lastInput*`/`lastInteractive*`
    /// denormalizations, and bumps `messageCount`.
    pub fn record_inbound(&mut self, inbound: &InboundRecord) {
        let at = now_iso();

        let effective_input = if !inbound.text.is_empty() {
            inbound.text.clone()
        } else {
            inbound
                .interactive_title
                .clone()
                .or_else(|| inbound.interactive_id.clone())
                .unwrap_or_default()
        };

        self.set("lastUserMessage", json!(inbound.text));
        self.set("lastUserMessageAt", json!(at));
        self.set("lastInput", json!(effective_input));
        self.set("lastInputAt", json!(at));
        if let Some(id) = &inbound.interactive_id {
            self.set("lastInteractiveId", json!(id));
        }
        if let Some(title) = &inbound.interactive_title {
            self.set("lastInteractiveTitle", json!(title));
        }
        if let Some(media) = &inbound.media {
            self.set("lastUserMedia", media.clone());
        }

        let count = self
            .get("messageCount")
            .and_then(Value::as_i64)
            .unwrap_or(0);
        self.set("messageCount", json!(count + 1));

        self.push_capped("inputHistory", json!(effective_input));

        let mut detail = Map::new();
        detail.insert("text".into(), json!(inbound.text));
        if let Some(id) = &inbound.interactive_id {
            detail.insert("interactiveId".into(), json!(id));
        }
        if let Some(title) = &inbound.interactive_title {
            detail.insert("interactiveTitle".into(), json!(title));
        }
        self.push_history("in:message", Value::Object(detail), &at);
    }

    /// Appends an outbound event to the history and refreshes the
    /// `lastBot*` denormalizations keyed on the event kind
    /// (`out:text`, `out:template`, `out:options`, `out:media`).
    pub fn record_outbound(&mut self, kind: &str, detail: Value) {
        let at = now_iso();
        match kind {
            "out:text" => {
                if let Some(text) = detail.get("text").cloned() {
                    self.set("lastBotMessage", text);
                }
                self.set("lastBotMessageAt", json!(at));
            }
            "out:template" => {
                if let Some(name) = detail.get("templateName").cloned() {
                    self.set("lastBotMessage", name);
                }
                self.set("lastBotMessageAt", json!(at));
            }
            "out:options" => {
                if let Some(options) = detail.get("options").cloned() {
                    self.set("lastBotOptions", options);
                }
                if let Some(text) = detail.get("text").cloned() {
                    self.set("lastBotMessage", text);
                }
                self.set("lastBotMessageAt", json!(at));
            }
            "out:media" => {
                self.set("lastBotMedia", detail.clone());
            }
            _ => {}
        }
        self.push_history(kind, detail, &at);
    }

    /// Appends an arbitrary event (e.g. `option-selection`) to the
    /// history without touching denormalized fields.
    pub fn record_event(&mut self, kind: &str, detail: Value) {
        let at = now_iso();
        self.push_history(kind, detail, &at);
    }

    fn push_history(&mut self, kind: &str, detail: Value, at: &str) {
        let mut entry = Map::new();
        entry.insert("kind".into(), json!(kind));
        entry.insert("at".into(), json!(at));
        if let Value::Object(fields) = detail {
            for (key, value) in fields {
                entry.entry(key).or_insert(value);
            }
        }
        self.push_capped("_meta.history", Value::Object(entry));
    }

    fn push_capped(&mut self, path: &str, entry: Value) {
        let mut items = match self.get(path) {
            Some(Value::Array(existing)) => existing.clone(),
            _ => Vec::new(),
        };
        items.push(entry);
        if items.len() > HISTORY_LIMIT {
            let excess = items.len() - HISTORY_LIMIT;
            items.drain(..excess);
        }
        self.set(path, Value::Array(items));
    }
}
