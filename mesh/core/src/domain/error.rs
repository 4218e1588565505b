// Copyright (c) 2026 Relaymail, Inc.
// SPDX-License-Identifier: AGPL-3.0
//! Domain error taxonomy.
//!
//! Store connectivity and timeout failures normally degrade through the
//! circuit breaker (neutral returns) and never surface here; the variants
//! below are for the paths that must be reported to callers.

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    #[error("store unreachable: {0}")]
    Connectivity(String),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed model response: {0}")]
    MalformedResponse(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("budget exhausted: {0}")]
    Capacity(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("gateway error: {0}")]
    Gateway(String),
}

impl MeshError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

impl From<serde_json::Error> for MeshError {
    fn from(err: serde_json::Error) -> Self {
        MeshError::Serialization(err.to_string())
    }
}
