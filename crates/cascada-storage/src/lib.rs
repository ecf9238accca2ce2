// SPDX-FileCopyrightText: 2026 Cascada Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence for the Cascada flow engine.
//!
//! The store is the authoritative shared state: sessions are updated by
//! primary key between executor steps, broadcast aggregates move by
//! atomic SQL deltas, and contact creation surfaces unique-constraint
//! races as conflicts for the resolver to re-read.

pub mod database;
pub mod migrations;
pub mod queries;

pub use database::Database;
