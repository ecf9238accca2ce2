// SPDX-FileCopyrightText: 2026 Cascada Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Cascada flow engine.

use thiserror::Error;

/// The primary error type used across all Cascada crates.
#[derive(Debug, Error)]
pub enum CascadaError {
    /// Malformed input: bad request bodies, bad flow-definition shapes,
    /// illegal node data.
    #[error("validation error: {0}")]
    Validation(String),

    /// A flow, contact, session, or broadcast recipient was not present
    /// where one was required.
    #[error("{0} not found")]
    NotFound(String),

    /// Resource conflicts: inactive flows, wrong channel, or a
    /// unique-constraint race signalling a concurrent insert.
    #[error("conflict: {0}")]
    Conflict(String),

    /// An outbound Meta Graph call failed. `status` carries the HTTP
    /// status (or 400 for local pre-flight failures), `details` the
    /// parsed error body when one was available.
    #[error("send failed ({status}): {message}")]
    Send {
        status: u16,
        message: String,
        details: Option<serde_json::Value>,
    },

    /// A runtime execution guard tripped: step limit exceeded or a node
    /// revisited within one invocation.
    #[error("execution guard: {0}")]
    Guard(String),

    /// Storage backend errors (database connection, query failure,
    /// serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Configuration errors (invalid TOML, missing required fields).
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CascadaError {
    /// Shorthand for a validation failure.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Shorthand for a missing-resource failure.
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }

    /// The HTTP status this error maps to at the gateway boundary.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::Send { status, .. } => *status,
            Self::Guard(_) | Self::Storage { .. } | Self::Config(_) | Self::Internal(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_mapping() {
        assert_eq!(CascadaError::validation("bad").http_status(), 400);
        assert_eq!(CascadaError::not_found("flow").http_status(), 404);
        assert_eq!(CascadaError::Conflict("race".into()).http_status(), 409);
        assert_eq!(
            CascadaError::Send {
                status: 502,
                message: "upstream".into(),
                details: None,
            }
            .http_status(),
            502
        );
        assert_eq!(CascadaError::Guard("loop".into()).http_status(), 500);
    }

    #[test]
    fn display_includes_message() {
        let err = CascadaError::NotFound("session".into());
        assert_eq!(err.to_string(), "session not found");

        let err = CascadaError::Send {
            status: 401,
            message: "token expired".into(),
            details: None,
        };
        assert!(err.to_string().contains("401"));
        assert!(err.to_string().contains("token expired"));
    }
}
