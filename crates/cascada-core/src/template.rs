// SPDX-FileCopyrightText: 2026 Cascada Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `{{ path }}` template interpolation against a JSON scope.
//!
//! A single linear scan: each `{{ ... }}` placeholder is replaced by
//! the value at the dot-separated path inside the scope. Missing values
//! render as the empty string. An unterminated `{{` is emitted
//! literally.

use serde_json::Value;

use crate::context::lookup_path;

/// Substitutes every `{{ path }}` occurrence in `input` with the value
/// found at `path` inside `scope`. Whitespace inside the braces is
/// tolerated.
pub fn interpolate(input: &str, scope: &Value) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        match after_open.find("}}") {
            Some(end) => {
                let path = after_open[..end].trim();
                out.push_str(&render(lookup_path(scope, path)));
                rest = &after_open[end + 2..];
            }
            None => {
                // No closing braces; keep the remainder literally.
                out.push_str(&rest[start..]);
                return out;
            }
        }
    }
    out.push_str(rest);
    out
}

fn render(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => other.to_string(),
    }
}
