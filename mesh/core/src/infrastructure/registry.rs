// Copyright (c) 2026 Relaymail, Inc.
// SPDX-License-Identifier: AGPL-3.0
//! Agent records backed by the shared store.

use std::sync::Arc;

use tracing::debug;

use crate::domain::agent::{Agent, AgentId, AgentKind};
use crate::domain::error::MeshError;
use crate::domain::network::NetworkId;
use crate::domain::task::TaskId;
use crate::infrastructure::store::{self, keys, SharedStore};

#[derive(Clone)]
pub struct AgentRegistry {
    store: Arc<dyn SharedStore>,
}

impl AgentRegistry {
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self { store }
    }

    pub async fn get(&self, id: AgentId) -> Result<Agent, MeshError> {
        store::get_json(self.store.as_ref(), &keys::agent(id))
            .await
            .ok_or_else(|| MeshError::not_found("agent", id))
    }

    pub async fn save(&self, agent: &Agent) -> bool {
        store::put_json(self.store.as_ref(), &keys::agent(agent.id), agent).await
    }

    /// Resolve every agent registered on a network, preserving registration
    /// order and skipping ids whose record is unreadable.
    pub async fn list_for_network(&self, network_id: NetworkId) -> Vec<Agent> {
        let ids = self
            .store
            .lrange(&keys::network_agents(network_id), 0, -1)
            .await;
        let mut agents = Vec::with_capacity(ids.len());
        for raw in ids {
            let Ok(id) = AgentId::from_string(&raw) else {
                continue;
            };
            if let Some(agent) = store::get_json::<Agent>(self.store.as_ref(), &keys::agent(id)).await {
                agents.push(agent);
            }
        }
        agents
    }

    /// Locate the network's coordinator agent.
    pub async fn coordinator_for(&self, network_id: NetworkId) -> Result<Agent, MeshError> {
        self.list_for_network(network_id)
            .await
            .into_iter()
            .find(|a| a.kind == AgentKind::Coordinator)
            .ok_or_else(|| MeshError::not_found("coordinator agent", network_id))
    }

    /// `idle -> busy`: a subtask was assigned.
    pub async fn mark_busy(
        &self,
        id: AgentId,
        task_id: TaskId,
        action: &str,
    ) -> Result<Agent, MeshError> {
        let mut agent = self.get(id).await?;
        agent.mark_busy(task_id, action);
        self.save(&agent).await;
        debug!(agent_id = %id, "agent busy");
        Ok(agent)
    }

    /// `busy -> idle` on completion; confidence is overwritten with the
    /// value the specialist reported.
    pub async fn mark_idle(
        &self,
        id: AgentId,
        task_id: TaskId,
        confidence: Option<f64>,
    ) -> Result<Agent, MeshError> {
        let mut agent = self.get(id).await?;
        agent.mark_idle(task_id);
        if let Some(confidence) = confidence {
            agent.set_confidence(confidence);
        }
        self.save(&agent).await;
        Ok(agent)
    }

    /// `-> error` on an unrecoverable gateway/parse failure for this
    /// agent's step.
    pub async fn mark_error(&self, id: AgentId, action: &str) -> Result<Agent, MeshError> {
        let mut agent = self.get(id).await?;
        agent.mark_error(action);
        self.save(&agent).await;
        Ok(agent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::{default_topology, AgentStatus, DEFAULT_MODEL};
    use crate::infrastructure::store::MemoryStore;

    async fn seeded() -> (AgentRegistry, Arc<MemoryStore>, NetworkId, Vec<Agent>) {
        let store = Arc::new(MemoryStore::new());
        let registry = AgentRegistry::new(store.clone());
        let network_id = NetworkId::new();
        let agents = default_topology(network_id);
        for agent in &agents {
            registry.save(agent).await;
            store
                .rpush(&keys::network_agents(network_id), &agent.id.to_string())
                .await;
        }
        (registry, store, network_id, agents)
    }

    #[tokio::test]
    async fn get_round_trips_saved_agent() {
        let (registry, _store, network_id, _) = seeded().await;
        let agent = Agent::new(network_id, "extra", AgentKind::Content, DEFAULT_MODEL);
        registry.save(&agent).await;
        let loaded = registry.get(agent.id).await.unwrap();
        assert_eq!(loaded.name, "extra");
        assert_eq!(loaded.kind, AgentKind::Content);
    }

    #[tokio::test]
    async fn missing_agent_is_not_found() {
        let (registry, _, _, _) = seeded().await;
        let err = registry.get(AgentId::new()).await.unwrap_err();
        assert!(matches!(err, MeshError::NotFound { kind: "agent", .. }));
    }

    #[tokio::test]
    async fn coordinator_lookup_finds_the_coordinator() {
        let (registry, _, network_id, agents) = seeded().await;
        let coordinator = registry.coordinator_for(network_id).await.unwrap();
        assert_eq!(coordinator.id, agents[0].id);
        assert_eq!(coordinator.kind, AgentKind::Coordinator);
    }

    #[tokio::test]
    async fn busy_idle_transition_persists_confidence() {
        let (registry, _, _, agents) = seeded().await;
        let specialist = agents[1].id;
        let task_id = TaskId::new();

        let busy = registry
            .mark_busy(specialist, task_id, "write copy")
            .await
            .unwrap();
        assert_eq!(busy.status, AgentStatus::Busy);

        let idle = registry
            .mark_idle(specialist, task_id, Some(0.55))
            .await
            .unwrap();
        assert_eq!(idle.status, AgentStatus::Idle);
        assert_eq!(idle.confidence, 0.55);

        let reloaded = registry.get(specialist).await.unwrap();
        assert_eq!(reloaded.confidence, 0.55);
    }
}
