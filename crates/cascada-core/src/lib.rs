// SPDX-FileCopyrightText: 2026 Cascada Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core domain types for the Cascada conversational flow engine.
//!
//! This crate holds everything the rest of the workspace agrees on:
//! the error taxonomy, the persisted entities, the flow-definition
//! graph model and its sanitizer, the per-session JSON context with
//! its bookkeeping rules, the `{{ path }}` template interpolator, and
//! the restricted boolean expression evaluator used by condition nodes.

pub mod context;
pub mod definition;
pub mod error;
pub mod expr;
pub mod template;
pub mod types;

pub use error::CascadaError;
