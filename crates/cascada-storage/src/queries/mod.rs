// SPDX-FileCopyrightText: 2026 Cascada Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules, one per entity.

pub mod broadcasts;
pub mod contacts;
pub mod flows;
pub mod logs;
pub mod sessions;
pub mod users;
