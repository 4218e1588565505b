// Copyright (c) 2026 Relaymail, Inc.
// SPDX-License-Identifier: AGPL-3.0

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkId(pub Uuid);

impl NetworkId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for NetworkId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NetworkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkStatus {
    Active,
    Archived,
}

/// A named collection of cooperating agents sharing tasks and memory.
///
/// The `agents`/`tasks`/`memories` collections are persisted as separate
/// store lists (see `infrastructure::store::keys`) so appends are
/// store-native; the document itself never embeds them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    pub id: NetworkId,
    pub name: String,
    pub description: String,
    pub status: NetworkStatus,
    /// Delegation-round budget inherited by tasks submitted to this network.
    pub max_iterations: u32,
    /// Wall-clock budget for one `process_task` call, in seconds.
    pub timeout_seconds: u64,
    #[serde(default)]
    pub shared_context: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Network {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: NetworkId::new(),
            name: name.into(),
            description: description.into(),
            status: NetworkStatus::Active,
            max_iterations: default_max_iterations(),
            timeout_seconds: default_timeout_seconds(),
            shared_context: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn archive(&mut self) {
        self.status = NetworkStatus::Archived;
        self.touch();
    }
}

fn default_max_iterations() -> u32 {
    10
}

fn default_timeout_seconds() -> u64 {
    300
}
