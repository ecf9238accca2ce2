// SPDX-FileCopyrightText: 2026 Cascada Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loading for the Cascada flow engine.
//!
//! TOML files follow the XDG hierarchy with `CASCADA_*` environment
//! overrides, plus the legacy environment aliases the deployment
//! surface documents (`META_VERIFY_TOKEN`, `PORT`, ...).

pub mod loader;
pub mod model;

pub use loader::{load_config, load_config_from_str};
pub use model::CascadaConfig;
