// Copyright (c) 2026 Relaymail, Inc.
// SPDX-License-Identifier: AGPL-3.0

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::error::MeshError;
use crate::domain::network::NetworkId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryId(pub Uuid);

impl MemoryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for MemoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MemoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    Fact,
    Context,
    Decision,
}

/// An append-only, confidence-scored entry shared across a network's agents.
/// Created once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: MemoryId,
    pub network_id: NetworkId,
    pub kind: MemoryKind,
    pub content: String,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl MemoryEntry {
    pub fn new(
        network_id: NetworkId,
        kind: MemoryKind,
        content: impl Into<String>,
        confidence: f64,
    ) -> Result<Self, MeshError> {
        if !(0.0..=1.0).contains(&confidence) || confidence.is_nan() {
            return Err(MeshError::Validation(format!(
                "memory confidence must lie in [0, 1], got {confidence}"
            )));
        }
        Ok(Self {
            id: MemoryId::new(),
            network_id,
            kind,
            content: content.into(),
            confidence,
            created_at: Utc::now(),
            metadata: HashMap::new(),
        })
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_out_of_range_is_a_validation_error() {
        let network_id = NetworkId::new();
        assert!(MemoryEntry::new(network_id, MemoryKind::Fact, "x", 1.2).is_err());
        assert!(MemoryEntry::new(network_id, MemoryKind::Fact, "x", -0.1).is_err());
        assert!(MemoryEntry::new(network_id, MemoryKind::Fact, "x", f64::NAN).is_err());
        assert!(MemoryEntry::new(network_id, MemoryKind::Fact, "x", 0.0).is_ok());
        assert!(MemoryEntry::new(network_id, MemoryKind::Fact, "x", 1.0).is_ok());
    }
}
