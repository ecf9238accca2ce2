// SPDX-FileCopyrightText: 2026 Cascada Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The flow executor: a bounded interpreter over a session's flow
//! graph.
//!
//! One invocation per inbound event. The walk advances node by node
//! until it must pause for user input, suspend for human handoff,
//! terminate, or error. `(current_node_id, context)` is persisted
//! between steps; a visited set and a step counter guard against
//! runaway graphs; failures mark the session `Errored` with the
//! context preserved and the failing node left in place.

use std::collections::HashSet;
use std::time::Duration;

use cascada_core::context::SessionContext;
use cascada_core::definition::{
    sanitize_str, ApiData, ApiMethod, AssignData, ConditionData, DelayData, EndData,
    FlowDefinition, FlowNode, GotoData, HandoffData, MediaData, MessageData, NodeType,
    OptionsData, TemplateParameterSpec, WhatsAppFlowData,
};
use cascada_core::expr;
use cascada_core::template::interpolate;
use cascada_core::types::{Contact, Flow, Session, SessionStatus, User};
use cascada_core::CascadaError;
use cascada_meta::payload::button_id;
use cascada_meta::{MetaClient, MetaCredentials, OutboundMessage, TemplateComponent};
use cascada_storage::queries::{logs, sessions};
use cascada_storage::Database;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

/// Hard cap on node steps within one invocation.
pub const MAX_STEPS: usize = 500;

/// Delay nodes never suspend longer than this, regardless of the
/// requested seconds.
pub const MAX_DELAY_MS: u64 = 60_000;

/// 15 s deadline for api-node HTTP calls.
const API_TIMEOUT: Duration = Duration::from_secs(15);

/// The milliseconds a delay node actually sleeps.
pub fn capped_delay_ms(seconds: u64) -> u64 {
    (seconds * 1000).min(MAX_DELAY_MS)
}

enum StepOutcome {
    /// Advance to an explicit node, or follow the first outgoing edge.
    Next(Option<String>),
    /// Persist as Paused at the current node and stop.
    Pause,
    /// Persist as Completed and stop.
    Finish,
}

/// Interprets flows for sessions. Holds the store handle, the Graph
/// client, and a plain HTTP client for api nodes.
#[derive(Clone)]
pub struct Executor {
    db: Database,
    meta: MetaClient,
    http: reqwest::Client,
}

impl Executor {
    pub fn new(db: Database, meta: MetaClient) -> Self {
        Self {
            db,
            meta,
            http: reqwest::Client::new(),
        }
    }

    /// Advances `session` for one inbound event. Returns the updated
    /// session; errors have already marked it `Errored` and preserved
    /// the context before propagating.
    pub async fn run(
        &self,
        user: &User,
        flow: &Flow,
        contact: &Contact,
        session: Session,
        inbound: &crate::inbound::InboundPayload,
    ) -> Result<Session, CascadaError> {
        let mut ctx = match SessionContext::from_json_str(&session.context) {
            Ok(ctx) => ctx,
            Err(err) => {
                self.fail_session(&session.id, session.current_node_id.as_deref(), &session.context)
                    .await;
                return Err(err);
            }
        };

        let definition = match sanitize_str(&flow.definition) {
            Ok(definition) => definition,
            Err(err) => {
                self.fail_session(
                    &session.id,
                    session.current_node_id.as_deref(),
                    &ctx.to_json_string(),
                )
                .await;
                return Err(err);
            }
        };

        // Resolve the starting node.
        let start = if session.status == SessionStatus::Paused && session.current_node_id.is_some()
        {
            let node_id = session.current_node_id.clone().unwrap_or_default();
            match resolve_resume_node(&definition, &node_id, &mut ctx, inbound) {
                Ok(start) => start,
                Err(err) => {
                    self.fail_session(&session.id, Some(&node_id), &ctx.to_json_string())
                        .await;
                    return Err(err);
                }
            }
        } else {
            let Some(trigger_node) = crate::trigger::select_trigger_node(&definition, &inbound.text)
            else {
                debug!(
                    session = session.id.as_str(),
                    "no trigger node matched, dropping inbound"
                );
                return Ok(session);
            };
            ctx.record_inbound(&inbound.record());
            ctx.set("triggerMessage", json!(inbound.text));
            trigger_node.id.clone()
        };

        // The walk.
        let mut visited: HashSet<String> = HashSet::new();
        let mut steps = 0usize;
        let mut current = start;

        let result: Result<(SessionStatus, Option<String>), CascadaError> = loop {
            steps += 1;
            if steps > MAX_STEPS {
                break Err(CascadaError::Guard(format!(
                    "step limit of {MAX_STEPS} exceeded"
                )));
            }
            if !visited.insert(current.clone()) {
                break Err(CascadaError::Guard(format!(
                    "node {current} revisited within one execution"
                )));
            }
            let Some(node) = definition.node(&current) else {
                break Err(CascadaError::not_found(format!("node {current}")));
            };

            // Persist progress before side effects.
            if let Err(err) = self
                .persist(&session.id, SessionStatus::Active, Some(&current), &ctx)
                .await
            {
                break Err(err);
            }

            match self
                .execute_node(user, flow, contact, node, &definition, &mut ctx)
                .await
            {
                Err(err) => break Err(err),
                Ok(StepOutcome::Pause) => {
                    if let Err(err) = self
                        .persist(&session.id, SessionStatus::Paused, Some(&current), &ctx)
                        .await
                    {
                        break Err(err);
                    }
                    break Ok((SessionStatus::Paused, Some(current.clone())));
                }
                Ok(StepOutcome::Finish) => {
                    if let Err(err) = self
                        .persist(&session.id, SessionStatus::Completed, None, &ctx)
                        .await
                    {
                        break Err(err);
                    }
                    break Ok((SessionStatus::Completed, None));
                }
                Ok(StepOutcome::Next(Some(next))) => current = next,
                Ok(StepOutcome::Next(None)) => match definition.first_outgoing(&current) {
                    Some(edge) => current = edge.target.clone(),
                    None => {
                        if let Err(err) = self
                            .persist(&session.id, SessionStatus::Completed, None, &ctx)
                            .await
                        {
                            break Err(err);
                        }
                        break Ok((SessionStatus::Completed, None));
                    }
                },
            }
        };

        match result {
            Ok((status, node_id)) => {
                info!(
                    session = session.id.as_str(),
                    status = %status,
                    steps,
                    "execution finished"
                );
                let context = ctx.to_json_string();
                if let Err(err) =
                    logs::append_session_log(&self.db, &session.id, &status.to_string(), &context)
                        .await
                {
                    warn!(session = session.id.as_str(), error = %err, "session log append failed");
                }
                Ok(Session {
                    status,
                    current_node_id: node_id,
                    context,
                    ..session
                })
            }
            Err(err) => {
                error!(
                    session = session.id.as_str(),
                    node = current.as_str(),
                    error = %err,
                    "execution failed"
                );
                self.fail_session(&session.id, Some(&current), &ctx.to_json_string())
                    .await;
                Err(err)
            }
        }
    }

    async fn persist(
        &self,
        session_id: &str,
        status: SessionStatus,
        node_id: Option<&str>,
        ctx: &SessionContext,
    ) -> Result<(), CascadaError> {
        sessions::update_session_state(&self.db, session_id, status, node_id, &ctx.to_json_string())
            .await
    }

    /// Marks the session `Errored` keeping the failing node in place,
    /// and appends the log snapshot. Best-effort: persistence failures
    /// here are logged, not raised, so the original error propagates.
    async fn fail_session(&self, session_id: &str, node_id: Option<&str>, context: &str) {
        if let Err(err) = sessions::update_session_state(
            &self.db,
            session_id,
            SessionStatus::Errored,
            node_id,
            context,
        )
        .await
        {
            warn!(session = session_id, error = %err, "failed to persist errored session");
        }
        if let Err(err) = logs::append_session_log(
            &self.db,
            session_id,
            &SessionStatus::Errored.to_string(),
            context,
        )
        .await
        {
            warn!(session = session_id, error = %err, "session log append failed");
        }
    }

    async fn execute_node(
        &self,
        user: &User,
        flow: &Flow,
        contact: &Contact,
        node: &FlowNode,
        definition: &FlowDefinition,
        ctx: &mut SessionContext,
    ) -> Result<StepOutcome, CascadaError> {
        debug!(node = node.id.as_str(), kind = %node.node_type, "executing node");
        match node.node_type {
            NodeType::Trigger => Ok(StepOutcome::Next(None)),

            NodeType::Message => {
                match MessageData::parse(&node.data)? {
                    MessageData::Text { text } => {
                        let body = interpolate(&text, &ctx.scope());
                        self.send(user, contact, &OutboundMessage::Text { body: body.clone() })
                            .await?;
                        ctx.record_outbound("out:text", json!({"text": body}));
                    }
                    MessageData::Template {
                        name,
                        language,
                        parameters,
                    } => {
                        let components = group_template_components(&parameters, &ctx.scope());
                        self.send(
                            user,
                            contact,
                            &OutboundMessage::Template {
                                name: name.clone(),
                                language: language.clone(),
                                components,
                            },
                        )
                        .await?;
                        ctx.record_outbound(
                            "out:template",
                            json!({"templateName": name, "templateLanguage": language}),
                        );
                    }
                }
                Ok(StepOutcome::Next(None))
            }

            NodeType::Options => {
                let data = OptionsData::parse(&node.data)?;
                let body = interpolate(&data.text, &ctx.scope());
                self.send(
                    user,
                    contact,
                    &OutboundMessage::Buttons {
                        body: body.clone(),
                        options: data.options.clone(),
                    },
                )
                .await?;
                ctx.record_outbound(
                    "out:options",
                    json!({"text": body, "options": data.options}),
                );
                Ok(StepOutcome::Pause)
            }

            NodeType::Delay => {
                let data = DelayData::parse(&node.data)?;
                tokio::time::sleep(Duration::from_millis(capped_delay_ms(data.seconds))).await;
                Ok(StepOutcome::Next(None))
            }

            NodeType::Condition => {
                let data = ConditionData::parse(&node.data)?;
                let outcome = expr::evaluate(&data.expression, &ctx.scope());
                let handle = if outcome { "true" } else { "false" };
                match definition.outgoing_with_handle(&node.id, handle) {
                    Some(edge) => Ok(StepOutcome::Next(Some(edge.target.clone()))),
                    None => Ok(StepOutcome::Finish),
                }
            }

            NodeType::Api => {
                let data = ApiData::parse(&node.data)?;
                let scope = ctx.scope();
                let url = interpolate(&data.url, &scope);
                let body = interpolate(&data.body, &scope);
                let result = self.call_api(&data, &url, &body, &scope).await;
                ctx.set(&data.assign_to, result);
                Ok(StepOutcome::Next(None))
            }

            NodeType::Assign => {
                let data = AssignData::parse(&node.data)?;
                let value = interpolate(&data.value, &ctx.scope());
                ctx.set(&data.key, json!(value));
                Ok(StepOutcome::Next(None))
            }

            NodeType::Media => {
                let data = MediaData::parse(&node.data)?;
                let scope = ctx.scope();
                let id = data
                    .id
                    .as_deref()
                    .map(|s| interpolate(s, &scope))
                    .filter(|s| !s.is_empty());
                let url = data
                    .url
                    .as_deref()
                    .map(|s| interpolate(s, &scope))
                    .filter(|s| !s.is_empty());
                let caption = data.caption.as_deref().map(|s| interpolate(s, &scope));
                self.send(
                    user,
                    contact,
                    &OutboundMessage::Media {
                        media_type: data.media_type,
                        id: id.clone(),
                        url: url.clone(),
                        caption,
                    },
                )
                .await?;
                ctx.record_outbound(
                    "out:media",
                    json!({"mediaType": data.media_type, "id": id, "url": url}),
                );
                Ok(StepOutcome::Next(None))
            }

            NodeType::WhatsappFlow => {
                let data = WhatsAppFlowData::parse(&node.data)?;
                let scope = ctx.scope();
                let body = interpolate(&data.body, &scope);
                if body.is_empty() {
                    return Err(CascadaError::Send {
                        status: 400,
                        message: "whatsapp_flow body is empty after interpolation".into(),
                        details: None,
                    });
                }
                let meta_flow_id = flow
                    .meta_flow_id
                    .clone()
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| CascadaError::Send {
                        status: 400,
                        message: "flow is not linked to a published Meta flow".into(),
                        details: None,
                    })?;
                let meta_flow_token = flow
                    .meta_flow_token
                    .clone()
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| CascadaError::Send {
                        status: 400,
                        message: "flow is missing its Meta flow token".into(),
                        details: None,
                    })?;
                self.send(
                    user,
                    contact,
                    &OutboundMessage::Flow {
                        flow_id: meta_flow_id,
                        flow_token: meta_flow_token,
                        version: flow.meta_flow_version.clone(),
                        header: data.header.as_deref().map(|s| interpolate(s, &scope)),
                        footer: data.footer.as_deref().map(|s| interpolate(s, &scope)),
                        cta: data.cta.clone(),
                        body: body.clone(),
                    },
                )
                .await?;
                ctx.record_outbound("out:flow", json!({"body": body}));
                Ok(StepOutcome::Next(None))
            }

            NodeType::Handoff => {
                let data = HandoffData::parse(&node.data)?;
                ctx.set("handoffQueue", json!(data.queue));
                if let Some(note) = &data.note {
                    ctx.set("handoffNote", json!(note));
                }
                Ok(StepOutcome::Pause)
            }

            NodeType::Goto => {
                let data = GotoData::parse(&node.data)?;
                Ok(StepOutcome::Next(Some(data.target_node_id)))
            }

            NodeType::End => {
                let data = EndData::parse(&node.data)?;
                ctx.set("endReason", json!(data.reason));
                Ok(StepOutcome::Finish)
            }
        }
    }

    async fn send(
        &self,
        user: &User,
        contact: &Contact,
        message: &OutboundMessage,
    ) -> Result<cascada_meta::SendOutcome, CascadaError> {
        let creds = MetaCredentials {
            access_token: user.access_token.clone(),
            phone_number_id: user.phone_number_id.clone(),
        };
        self.meta.send_message(&creds, &contact.phone, message).await
    }

    /// Fires an api-node request. Any failure, timeout included,
    /// resolves to `{"error": "API call failed"}` so the walk proceeds.
    async fn call_api(&self, data: &ApiData, url: &str, body: &str, scope: &Value) -> Value {
        let method = match data.method {
            ApiMethod::Get => reqwest::Method::GET,
            ApiMethod::Post => reqwest::Method::POST,
            ApiMethod::Put => reqwest::Method::PUT,
            ApiMethod::Patch => reqwest::Method::PATCH,
            ApiMethod::Delete => reqwest::Method::DELETE,
        };
        let mut request = self.http.request(method, url).timeout(API_TIMEOUT);
        for (key, value) in &data.headers {
            request = request.header(key, interpolate(value, scope));
        }
        if data.method != ApiMethod::Get && !body.is_empty() {
            request = request.body(body.to_string());
        }
        match request.send().await {
            Ok(response) if response.status().is_success() => {
                let text = response.text().await.unwrap_or_default();
                serde_json::from_str(&text).unwrap_or(Value::String(text))
            }
            Ok(response) => {
                warn!(url, status = %response.status(), "api node call failed");
                json!({"error": "API call failed"})
            }
            Err(err) => {
                warn!(url, error = %err, "api node call failed");
                json!({"error": "API call failed"})
            }
        }
    }
}

/// Resolves where a paused session resumes: options nodes dispatch on
/// the user's selection, anything else re-enters the parked node.
fn resolve_resume_node(
    definition: &FlowDefinition,
    node_id: &str,
    ctx: &mut SessionContext,
    inbound: &crate::inbound::InboundPayload,
) -> Result<String, CascadaError> {
    let Some(node) = definition.node(node_id) else {
        return Err(CascadaError::not_found(format!(
            "paused node {node_id} in flow definition"
        )));
    };
    ctx.record_inbound(&inbound.record());
    if node.node_type != NodeType::Options {
        return Ok(node_id.to_string());
    }

    let data = OptionsData::parse(&node.data)?;
    let mut selection: Option<usize> = None;
    if let Some(reply_id) = &inbound.interactive_id {
        selection = data.options.iter().position(|o| button_id(o) == *reply_id);
        if selection.is_none() {
            selection = (0..data.options.len()).find(|i| format!("opt-{i}") == *reply_id);
        }
    }
    if selection.is_none() && !inbound.text.trim().is_empty() {
        let needle = inbound.text.trim().to_lowercase();
        selection = data
            .options
            .iter()
            .position(|o| o.trim().to_lowercase() == needle);
    }

    ctx.record_event(
        "option-selection",
        json!({
            "optionIndex": selection,
            "matchedOption": selection.map(|i| data.options[i].clone()),
        }),
    );

    let handle = match selection {
        Some(i) => format!("opt-{i}"),
        None => "no-match".to_string(),
    };
    let edge = definition
        .outgoing_with_handle(node_id, &handle)
        .ok_or_else(|| {
            CascadaError::not_found(format!("edge {handle:?} out of options node {node_id}"))
        })?;
    if definition.node(&edge.target).is_none() {
        return Err(CascadaError::not_found(format!("node {}", edge.target)));
    }
    Ok(edge.target.clone())
}

/// Groups interpolated template parameters into components keyed by
/// `(type, sub_type, index)`, preserving first-seen order.
fn group_template_components(
    parameters: &[TemplateParameterSpec],
    scope: &Value,
) -> Vec<TemplateComponent> {
    let mut components: Vec<TemplateComponent> = Vec::new();
    for spec in parameters {
        let value = interpolate(&spec.value, scope);
        let component_type = spec.component.to_lowercase();
        let sub_type = spec.sub_type.as_ref().map(|s| s.to_lowercase());
        let index = spec.index.filter(|i| i.is_finite());
        if let Some(existing) = components.iter_mut().find(|c| {
            c.component_type == component_type && c.sub_type == sub_type && c.index == index
        }) {
            existing.parameters.push(value);
        } else {
            components.push(TemplateComponent {
                component_type,
                sub_type,
                index,
                parameters: vec![value],
            });
        }
    }
    components
}
