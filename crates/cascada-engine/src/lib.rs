// SPDX-FileCopyrightText: 2026 Cascada Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Cascada flow execution engine.
//!
//! [`Engine`] is the entry point the gateway drives: it resolves
//! contacts and sessions, matches triggers, interprets flow nodes, and
//! reconciles broadcast delivery statuses. All state lives in the
//! store; the engine re-fetches what it needs on every invocation.

pub mod executor;
pub mod inbound;
pub mod reconciler;
pub mod resolver;
pub mod trigger;

use std::collections::HashMap;

use cascada_core::types::{FlowStatus, Session, User};
use cascada_core::CascadaError;
use cascada_meta::MetaClient;
use cascada_storage::queries::{flows, sessions, users};
use cascada_storage::Database;
use serde_json::Value;
use tracing::{debug, info};

use crate::executor::Executor;
use crate::inbound::InboundPayload;

/// A manual trigger request (the `POST /flows/:id/trigger` body, after
/// gateway validation).
#[derive(Debug, Clone, Default)]
pub struct ManualTrigger {
    pub from: String,
    pub message: Option<String>,
    pub name: Option<String>,
    pub variables: Option<serde_json::Map<String, Value>>,
    /// Opaque inbound metadata; `media` is carried through unvalidated.
    pub incoming_meta: Option<Value>,
}

/// What a successful manual trigger reports back.
#[derive(Debug, Clone)]
pub struct TriggerOutcome {
    pub flow_id: String,
    pub contact_id: String,
    pub session_id: String,
}

/// The engine facade: owns the store handle and the Graph client.
#[derive(Clone)]
pub struct Engine {
    db: Database,
    executor: Executor,
}

impl Engine {
    pub fn new(db: Database, meta: MetaClient) -> Self {
        let executor = Executor::new(db.clone(), meta);
        Self { db, executor }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Processes one inbound webhook message for a tenant: contact
    /// resolution, session selection (existing open session first,
    /// trigger matching otherwise), then execution.
    pub async fn handle_webhook_message(
        &self,
        user: &User,
        message: &Value,
        profile_names: &HashMap<String, String>,
    ) -> Result<(), CascadaError> {
        let Some(inbound) = InboundPayload::from_meta_message(message, profile_names) else {
            debug!("webhook message without a sender, skipping");
            return Ok(());
        };

        let contact = resolver::get_or_create_contact(
            &self.db,
            &user.id,
            &inbound.from,
            inbound.profile_name.as_deref(),
            &[],
        )
        .await?;

        let (session, flow) = match resolver::find_resumable_session(&self.db, &contact).await? {
            Some(found) => found,
            None => {
                let candidates = flows::list_active_whatsapp_flows(&self.db, &user.id).await?;
                let Some(flow) = trigger::select_flow(
                    &candidates,
                    &inbound.text,
                    inbound.interactive_title.as_deref(),
                    inbound.interactive_id.as_deref(),
                ) else {
                    debug!(contact = contact.id.as_str(), "no flow matched inbound");
                    return Ok(());
                };
                let flow = flow.clone();
                let session =
                    resolver::ensure_active_session_for_flow(&self.db, &contact.id, &flow.id)
                        .await?;
                (session, flow)
            }
        };

        self.executor
            .run(user, &flow, &contact, session, &inbound)
            .await?;
        Ok(())
    }

    /// Drives a flow directly for a caller-specified contact, bypassing
    /// webhook dispatch and flow selection.
    pub async fn trigger_flow(
        &self,
        flow_id: &str,
        request: ManualTrigger,
    ) -> Result<TriggerOutcome, CascadaError> {
        let flow = flows::get_flow(&self.db, flow_id)
            .await?
            .ok_or_else(|| CascadaError::not_found("flow"))?;
        if flow.status != FlowStatus::Active {
            return Err(CascadaError::Conflict(format!(
                "flow is not active (status: {})",
                flow.status
            )));
        }
        if flow.channel != "whatsapp" {
            return Err(CascadaError::Conflict(format!(
                "flow channel {:?} cannot be triggered over WhatsApp",
                flow.channel
            )));
        }
        let user = users::get_user(&self.db, &flow.user_id)
            .await?
            .ok_or_else(|| CascadaError::not_found("flow owner"))?;

        let contact = resolver::get_or_create_contact(
            &self.db,
            &user.id,
            &request.from,
            request.name.as_deref(),
            &[],
        )
        .await?;

        let session =
            resolver::ensure_active_session_for_flow(&self.db, &contact.id, &flow.id).await?;
        let session = self
            .seed_variables(session, request.variables.as_ref())
            .await?;

        let inbound = InboundPayload {
            from: contact.phone.clone(),
            text: request.message.clone().unwrap_or_default(),
            media: request
                .incoming_meta
                .as_ref()
                .and_then(|meta| meta.get("media"))
                .filter(|m| !m.is_null())
                .cloned(),
            ..Default::default()
        };

        info!(
            flow = flow.id.as_str(),
            contact = contact.id.as_str(),
            session = session.id.as_str(),
            "manual trigger"
        );
        let session = self
            .executor
            .run(&user, &flow, &contact, session, &inbound)
            .await?;

        Ok(TriggerOutcome {
            flow_id: flow.id,
            contact_id: contact.id,
            session_id: session.id,
        })
    }

    /// Reconciles a batch of Meta delivery statuses for a tenant.
    pub async fn reconcile_statuses(&self, user: &User, statuses: &[Value]) {
        reconciler::reconcile_statuses(&self.db, user, statuses).await;
    }

    /// Writes caller-provided variables into the session context before
    /// execution starts.
    async fn seed_variables(
        &self,
        session: Session,
        variables: Option<&serde_json::Map<String, Value>>,
    ) -> Result<Session, CascadaError> {
        let Some(variables) = variables.filter(|v| !v.is_empty()) else {
            return Ok(session);
        };
        let mut ctx = cascada_core::context::SessionContext::from_json_str(&session.context)?;
        for (key, value) in variables {
            ctx.set(key, value.clone());
        }
        sessions::update_session_state(
            &self.db,
            &session.id,
            session.status,
            session.current_node_id.as_deref(),
            &ctx.to_json_string(),
        )
        .await?;
        Ok(Session {
            context: ctx.to_json_string(),
            ..session
        })
    }
}
