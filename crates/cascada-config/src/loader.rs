// SPDX-FileCopyrightText: 2026 Cascada Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./cascada.toml` > `~/.config/cascada/cascada.toml`
//! > `/etc/cascada/cascada.toml` with environment variable overrides via
//! the `CASCADA_` prefix, plus the legacy aliases the deployment surface
//! documents: `META_VERIFY_TOKEN` (also `WHATSAPP_VERIFY_TOKEN`,
//! `VERIFY_TOKEN`) and `PORT` (also `APP_PORT`).

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::CascadaConfig;

/// Load configuration from the standard XDG hierarchy with env var
/// overrides and legacy aliases applied last.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/cascada/cascada.toml` (system-wide)
/// 3. `~/.config/cascada/cascada.toml` (user XDG config)
/// 4. `./cascada.toml` (local directory)
/// 5. `CASCADA_*` environment variables
/// 6. Legacy aliases (`META_VERIFY_TOKEN`, `PORT`, ...)
pub fn load_config() -> Result<CascadaConfig, figment::Error> {
    let mut config: CascadaConfig = Figment::new()
        .merge(Serialized::defaults(CascadaConfig::default()))
        .merge(Toml::file("/etc/cascada/cascada.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("cascada/cascada.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("cascada.toml"))
        .merge(env_provider())
        .extract()?;
    apply_legacy_aliases(&mut config);
    Ok(config)
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and for explicitly supplied config content.
pub fn load_config_from_str(toml_content: &str) -> Result<CascadaConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CascadaConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` to avoid ambiguity
/// with underscore-containing key names: `CASCADA_META_VERIFY_TOKEN`
/// must map to `meta.verify_token`, not `meta.verify.token`.
fn env_provider() -> Env {
    Env::prefixed("CASCADA_").map(|key| {
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("server_", "server.", 1)
            .replacen("meta_", "meta.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("log_", "log.", 1);
        mapped.into()
    })
}

/// Applies the legacy environment aliases after extraction: the first
/// present verify-token alias wins, and `PORT`/`APP_PORT` override the
/// configured port when they parse.
fn apply_legacy_aliases(config: &mut CascadaConfig) {
    for name in ["META_VERIFY_TOKEN", "WHATSAPP_VERIFY_TOKEN", "VERIFY_TOKEN"] {
        if let Ok(token) = std::env::var(name) {
            if !token.is_empty() {
                config.meta.verify_token = Some(token);
                break;
            }
        }
    }
    for name in ["PORT", "APP_PORT"] {
        if let Ok(raw) = std::env::var(name) {
            if let Ok(port) = raw.parse::<u16>() {
                config.server.port = port;
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_from_toml_string() {
        let config = load_config_from_str(
            r#"
            [server]
            port = 8080

            [meta]
            verify_token = "secret"

            [storage]
            database_path = "/tmp/test.db"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.meta.verify_token.as_deref(), Some("secret"));
        assert_eq!(config.storage.database_path, "/tmp/test.db");
        // Untouched sections keep defaults.
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn empty_toml_yields_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result = load_config_from_str("[server]\nbananas = 1\n");
        assert!(result.is_err());
    }
}
