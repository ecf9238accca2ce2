// SPDX-FileCopyrightText: 2026 Cascada Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The `serve` subcommand: configuration, logging, storage, and the
//! gateway, wired together.

use std::sync::Arc;

use cascada_core::CascadaError;
use cascada_engine::Engine;
use cascada_gateway::{start_server, GatewayState};
use cascada_meta::MetaClient;
use cascada_storage::Database;
use tracing_subscriber::EnvFilter;

pub async fn run() -> Result<(), CascadaError> {
    let config = cascada_config::load_config()
        .map_err(|e| CascadaError::Config(format!("configuration load failed: {e}")))?;

    let default_level = if config.log.verbose {
        "debug"
    } else {
        config.log.level.as_str()
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        database = config.storage.database_path.as_str(),
        "starting cascada"
    );

    let db = Database::open(&config.storage.database_path).await?;

    let mut meta = MetaClient::new()?;
    if let Some(base_url) = &config.meta.graph_base_url {
        meta = meta.with_base_url(base_url.clone());
    }

    let state = GatewayState {
        engine: Arc::new(Engine::new(db, meta)),
        verify_token: config.meta.verify_token.clone(),
    };
    if state.verify_token.is_none() {
        tracing::warn!("no verify token configured; webhook verification will be rejected");
    }

    start_server(&config.server.host, config.server.port, state).await
}
