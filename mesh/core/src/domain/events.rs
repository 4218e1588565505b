// Copyright (c) 2026 Relaymail, Inc.
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::network::NetworkId;
use crate::domain::task::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskUpdateKind {
    TaskStarted,
    SubtaskStarted,
    SubtaskCompleted,
    AgentStatusChanged,
    TaskCompleted,
    TaskFailed,
}

/// Unified progress event for the mesh.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MeshEvent {
    TaskUpdate {
        network_id: NetworkId,
        task_id: TaskId,
        kind: TaskUpdateKind,
        payload: serde_json::Value,
        at: DateTime<Utc>,
    },
    NetworkUpdate {
        network_id: NetworkId,
        payload: serde_json::Value,
        at: DateTime<Utc>,
    },
}

impl MeshEvent {
    pub fn network_id(&self) -> NetworkId {
        match self {
            MeshEvent::TaskUpdate { network_id, .. } => *network_id,
            MeshEvent::NetworkUpdate { network_id, .. } => *network_id,
        }
    }
}

/// Fire-and-forget progress broadcasting. Implementations log delivery
/// failures and must never abort task processing.
#[async_trait]
pub trait EventBroadcaster: Send + Sync {
    async fn broadcast_task_update(
        &self,
        network_id: NetworkId,
        task_id: TaskId,
        kind: TaskUpdateKind,
        payload: serde_json::Value,
    );

    async fn broadcast_network_update(&self, network_id: NetworkId, payload: serde_json::Value);
}
