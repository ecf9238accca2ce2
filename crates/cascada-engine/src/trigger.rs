// SPDX-FileCopyrightText: 2026 Cascada Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trigger matching: score-based flow selection over a tenant's active
//! flows, and trigger-node selection inside a chosen flow.

use cascada_core::definition::{FlowDefinition, FlowNode, TriggerData};
use cascada_core::types::Flow;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Normalizes a trigger or input string: NFD decomposition with
/// combining marks stripped, lowercased, trimmed. Idempotent and
/// case/diacritic-insensitive.
pub fn normalize(input: &str) -> String {
    input
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
        .trim()
        .to_string()
}

/// Keyword candidates derived from the inbound text and interactive
/// fields: each source contributes its whole normalized form plus every
/// whitespace-separated part.
pub fn keyword_candidates(
    text: &str,
    interactive_title: Option<&str>,
    interactive_id: Option<&str>,
) -> Vec<String> {
    let mut candidates = Vec::new();
    for source in [Some(text), interactive_title, interactive_id]
        .into_iter()
        .flatten()
    {
        let normalized = normalize(source);
        if normalized.is_empty() {
            continue;
        }
        if !candidates.contains(&normalized) {
            candidates.push(normalized.clone());
        }
        for part in normalized.split_whitespace() {
            if !candidates.iter().any(|c| c == part) {
                candidates.push(part.to_string());
            }
        }
    }
    candidates
}

/// Scores one flow trigger against the inbound fields. `None` means the
/// trigger is empty and the flow is not a candidate; 0 means no match.
fn score_trigger(
    trigger: &str,
    candidates: &[String],
    normalized_text: &str,
    normalized_title: &str,
    normalized_id: &str,
) -> Option<u32> {
    let trigger = normalize(trigger);
    if trigger.is_empty() {
        return None;
    }
    if trigger == "default" {
        return Some(1);
    }
    let matched = candidates.iter().any(|c| *c == trigger)
        || normalized_text.contains(&trigger)
        || (!normalized_title.is_empty() && normalized_title.contains(&trigger))
        || (!normalized_id.is_empty() && normalized_id == trigger);
    if !matched {
        return Some(0);
    }
    let mut score = 6;
    if normalized_text == trigger {
        score += 2;
    }
    if normalized_title == trigger {
        score += 1;
    }
    if normalized_id == trigger {
        score += 1;
    }
    Some(score)
}

/// Selects the flow an inbound message should start, among a tenant's
/// active WhatsApp flows.
///
/// Highest score wins; ties break on the most recent `updated_at`. When
/// nothing scores above zero the most recently updated
/// `default`-triggered flow is preferred, then the first candidate in
/// input order.
pub fn select_flow<'a>(
    flows: &'a [Flow],
    text: &str,
    interactive_title: Option<&str>,
    interactive_id: Option<&str>,
) -> Option<&'a Flow> {
    if flows.is_empty() {
        return None;
    }
    let candidates = keyword_candidates(text, interactive_title, interactive_id);
    let normalized_text = normalize(text);
    let normalized_title = interactive_title.map(normalize).unwrap_or_default();
    let normalized_id = interactive_id.map(normalize).unwrap_or_default();

    let best = flows
        .iter()
        .filter_map(|flow| {
            score_trigger(
                &flow.trigger,
                &candidates,
                &normalized_text,
                &normalized_title,
                &normalized_id,
            )
            .filter(|score| *score > 0)
            .map(|score| (score, flow))
        })
        .max_by(|(a_score, a), (b_score, b)| {
            a_score
                .cmp(b_score)
                .then_with(|| a.updated_at.cmp(&b.updated_at))
        });
    if let Some((_, flow)) = best {
        return Some(flow);
    }

    flows
        .iter()
        .filter(|flow| normalize(&flow.trigger) == "default")
        .max_by(|a, b| a.updated_at.cmp(&b.updated_at))
        .or_else(|| flows.first())
}

/// Selects the trigger node a new session starts at, matching node
/// keywords against the inbound text only. First keyword match wins,
/// then the first `default`-keyword node; `None` drops the inbound.
pub fn select_trigger_node<'a>(
    definition: &'a FlowDefinition,
    text: &str,
) -> Option<&'a FlowNode> {
    let candidates = keyword_candidates(text, None, None);
    let normalized_text = normalize(text);

    let mut default_node = None;
    for node in definition.trigger_nodes() {
        let Ok(data) = TriggerData::parse(&node.data) else {
            continue;
        };
        let keyword = normalize(&data.keyword);
        if keyword.is_empty() {
            continue;
        }
        if candidates.iter().any(|c| *c == keyword) || normalized_text.contains(&keyword) {
            return Some(node);
        }
        if keyword == "default" && default_node.is_none() {
            default_node = Some(node);
        }
    }
    default_node
}
