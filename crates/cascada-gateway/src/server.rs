// SPDX-FileCopyrightText: 2026 Cascada Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, CORS, and shared state for the gateway.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Json, Router,
};
use cascada_core::CascadaError;
use cascada_engine::Engine;
use serde::Serialize;
use tower_http::cors::CorsLayer;

use crate::flows;
use crate::webhook;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    /// The flow engine.
    pub engine: Arc<Engine>,
    /// Fallback webhook verification token (`None` rejects all
    /// verification attempts).
    pub verify_token: Option<String>,
}

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Health status string.
    pub status: String,
    /// Binary version.
    pub version: String,
}

/// GET /health
async fn get_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Builds the gateway router over the shared state.
pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route(
            "/meta/webhook",
            get(webhook::verify_webhook).post(webhook::receive_webhook),
        )
        .route("/flows/:flow_id/trigger", post(flows::trigger_flow))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds and serves the gateway until the process is stopped.
pub async fn start_server(
    host: &str,
    port: u16,
    state: GatewayState,
) -> Result<(), CascadaError> {
    let app = build_router(state);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| CascadaError::Config(format!("failed to bind gateway to {addr}: {e}")))?;

    tracing::info!("gateway listening on {addr}");

    axum::serve(listener, app)
        .await
        .map_err(|e| CascadaError::Internal(format!("gateway server error: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_response_serializes() {
        let resp = HealthResponse {
            status: "ok".to_string(),
            version: "0.1.0".to_string(),
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"status\":\"ok\""));
        assert!(json.contains("\"version\":\"0.1.0\""));
    }
}
