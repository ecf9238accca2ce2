// SPDX-FileCopyrightText: 2026 Cascada Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Flow CRUD. Definitions are stored as JSON text and must survive a
//! round-trip through the sanitizer without semantic loss.

use cascada_core::types::{Flow, FlowStatus};
use cascada_core::CascadaError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};

const COLUMNS: &str = "id, user_id, name, trigger_keyword, status, channel, definition, \
                       meta_flow_id, meta_flow_token, meta_flow_version, created_at, updated_at";

fn row_to_flow(row: &rusqlite::Row<'_>) -> rusqlite::Result<Flow> {
    let status_raw: String = row.get(4)?;
    let status = status_raw.parse::<FlowStatus>().map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("unknown flow status {status_raw:?}").into(),
        )
    })?;
    Ok(Flow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        trigger: row.get(3)?,
        status,
        channel: row.get(5)?,
        definition: row.get(6)?,
        meta_flow_id: row.get(7)?,
        meta_flow_token: row.get(8)?,
        meta_flow_version: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

/// Create a new flow.
pub async fn create_flow(db: &Database, flow: &Flow) -> Result<(), CascadaError> {
    let flow = flow.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO flows (id, user_id, name, trigger_keyword, status, channel, \
                 definition, meta_flow_id, meta_flow_token, meta_flow_version, created_at, \
                 updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    flow.id,
                    flow.user_id,
                    flow.name,
                    flow.trigger,
                    flow.status.to_string(),
                    flow.channel,
                    flow.definition,
                    flow.meta_flow_id,
                    flow.meta_flow_token,
                    flow.meta_flow_version,
                    flow.created_at,
                    flow.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Get a flow by ID.
pub async fn get_flow(db: &Database, id: &str) -> Result<Option<Flow>, CascadaError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM flows WHERE id = ?1"))?;
            match stmt.query_row(params![id], row_to_flow) {
                Ok(flow) => Ok(Some(flow)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// The tenant's flows eligible for inbound routing: active, WhatsApp
/// channel, most recently updated first.
pub async fn list_active_whatsapp_flows(
    db: &Database,
    user_id: &str,
) -> Result<Vec<Flow>, CascadaError> {
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM flows \
                 WHERE user_id = ?1 AND status = 'active' AND channel = 'whatsapp' \
                 ORDER BY updated_at DESC"
            ))?;
            let rows = stmt.query_map(params![user_id], row_to_flow)?;
            let mut flows = Vec::new();
            for row in rows {
                flows.push(row?);
            }
            Ok(flows)
        })
        .await
        .map_err(map_tr_err)
}

/// Update a flow's lifecycle status.
pub async fn update_flow_status(
    db: &Database,
    id: &str,
    status: FlowStatus,
) -> Result<(), CascadaError> {
    let id = id.to_string();
    let status = status.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE flows SET status = ?1, \
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?2",
                params![status, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Replace a flow's definition blob.
pub async fn update_flow_definition(
    db: &Database,
    id: &str,
    definition: &str,
) -> Result<(), CascadaError> {
    let id = id.to_string();
    let definition = definition.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE flows SET definition = ?1, \
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?2",
                params![definition, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
