// Copyright (c) 2026 Relaymail, Inc.
// SPDX-License-Identifier: AGPL-3.0
//! Network lifecycle: creation with default agent topology, resolution with
//! embedded agent records, cascading deletion.

use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::agent::{default_topology, topology_from_specs, Agent, AgentSpec};
use crate::domain::memory::MemoryId;
use crate::domain::network::{Network, NetworkId};
use crate::domain::task::TaskId;
use crate::infrastructure::registry::AgentRegistry;
use crate::infrastructure::store::{self, keys, SharedStore, StoreCommand};

/// A network resolved for callers: full agent records, not just ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkView {
    pub network: Network,
    pub agents: Vec<Agent>,
    pub tasks: Vec<TaskId>,
    pub memories: Vec<MemoryId>,
}

pub struct NetworkManager {
    store: Arc<dyn SharedStore>,
    registry: AgentRegistry,
}

impl NetworkManager {
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        let registry = AgentRegistry::new(store.clone());
        Self { store, registry }
    }

    /// Persist a network and its agents. When `agent_specs` is omitted the
    /// default topology (one agent per kind) is created. The whole write is
    /// one pipeline round-trip.
    pub async fn create_network(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        agent_specs: Option<Vec<AgentSpec>>,
    ) -> Result<NetworkId> {
        let network = Network::new(name, description);
        let agents = match &agent_specs {
            Some(specs) => topology_from_specs(network.id, specs),
            None => default_topology(network.id),
        };

        let mut commands = vec![StoreCommand::Set {
            key: keys::network(network.id),
            value: serde_json::to_string(&network)?,
        }];
        for agent in &agents {
            commands.push(StoreCommand::Set {
                key: keys::agent(agent.id),
                value: serde_json::to_string(agent)?,
            });
            commands.push(StoreCommand::RPush {
                key: keys::network_agents(network.id),
                value: agent.id.to_string(),
            });
        }

        if !self.store.pipeline(commands).await {
            anyhow::bail!("store rejected network creation");
        }

        info!(
            network_id = %network.id,
            agents = agents.len(),
            "network created"
        );
        Ok(network.id)
    }

    /// Resolve a network and embed its full agent records.
    pub async fn get_network(&self, id: NetworkId) -> Option<NetworkView> {
        let network: Network = store::get_json(self.store.as_ref(), &keys::network(id)).await?;
        let agents = self.registry.list_for_network(id).await;
        let tasks = self
            .store
            .lrange(&keys::network_tasks(id), 0, -1)
            .await
            .iter()
            .filter_map(|raw| TaskId::from_string(raw).ok())
            .collect();
        let memories = self
            .store
            .lrange(&keys::network_memories(id), 0, -1)
            .await
            .iter()
            .filter_map(|raw| MemoryId::from_string(raw).ok())
            .collect();
        Some(NetworkView {
            network,
            agents,
            tasks,
            memories,
        })
    }

    pub async fn list_networks(&self) -> Vec<Network> {
        let mut networks = Vec::new();
        for key in self.store.keys(keys::NETWORK_PATTERN).await {
            if keys::network_id_from_key(&key).is_none() {
                continue;
            }
            if let Some(network) = store::get_json::<Network>(self.store.as_ref(), &key).await {
                networks.push(network);
            }
        }
        networks
    }

    /// Delete the network and cascade to every agent it references. Tasks
    /// and memories stay behind as orphaned records.
    pub async fn delete_network(&self, id: NetworkId) -> bool {
        if self.store.get(&keys::network(id)).await.is_none() {
            return false;
        }

        let agent_ids = self.store.lrange(&keys::network_agents(id), 0, -1).await;
        let mut commands: Vec<StoreCommand> = agent_ids
            .iter()
            .filter_map(|raw| {
                crate::domain::agent::AgentId::from_string(raw)
                    .ok()
                    .map(|agent_id| StoreCommand::Delete {
                        key: keys::agent(agent_id),
                    })
            })
            .collect();
        commands.push(StoreCommand::Delete {
            key: keys::network_agents(id),
        });
        commands.push(StoreCommand::Delete {
            key: keys::network_tasks(id),
        });
        commands.push(StoreCommand::Delete {
            key: keys::network_memories(id),
        });
        commands.push(StoreCommand::Delete {
            key: keys::network(id),
        });

        let deleted = self.store.pipeline(commands).await;
        if deleted {
            info!(network_id = %id, agents = agent_ids.len(), "network deleted");
        } else {
            warn!(network_id = %id, "network deletion rejected by store");
        }
        deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::AgentKind;
    use crate::infrastructure::store::MemoryStore;
    use std::collections::HashSet;

    fn manager() -> (NetworkManager, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (NetworkManager::new(store.clone()), store)
    }

    #[tokio::test]
    async fn create_builds_default_topology() {
        let (manager, _) = manager();
        let id = manager
            .create_network("campaigns", "re-engagement", None)
            .await
            .unwrap();

        let view = manager.get_network(id).await.unwrap();
        assert_eq!(view.network.name, "campaigns");
        assert_eq!(view.agents.len(), 6);
        let kinds: HashSet<AgentKind> = view.agents.iter().map(|a| a.kind).collect();
        assert_eq!(kinds.len(), 6);
        assert!(view.tasks.is_empty());
        assert!(view.memories.is_empty());
    }

    #[tokio::test]
    async fn embedded_agents_match_persisted_registrations() {
        let (manager, store) = manager();
        let id = manager
            .create_network("campaigns", "re-engagement", None)
            .await
            .unwrap();

        let view = manager.get_network(id).await.unwrap();
        let embedded: HashSet<String> = view.agents.iter().map(|a| a.id.to_string()).collect();
        let persisted: HashSet<String> = store
            .lrange(&keys::network_agents(id), 0, -1)
            .await
            .into_iter()
            .collect();
        assert_eq!(embedded, persisted);
        assert_eq!(embedded.len(), view.agents.len(), "no duplicates");
    }

    #[tokio::test]
    async fn explicit_specs_override_default_topology() {
        let (manager, _) = manager();
        let specs = vec![
            AgentSpec {
                name: "coord".into(),
                kind: AgentKind::Coordinator,
                model: "gpt-4o".into(),
                capabilities: vec![],
            },
            AgentSpec {
                name: "writer".into(),
                kind: AgentKind::Content,
                model: "gpt-4o".into(),
                capabilities: vec!["haiku".into()],
            },
        ];
        let id = manager
            .create_network("tiny", "two agents", Some(specs))
            .await
            .unwrap();
        let view = manager.get_network(id).await.unwrap();
        assert_eq!(view.agents.len(), 2);
        assert_eq!(view.agents[1].capabilities, vec!["haiku".to_string()]);
    }

    #[tokio::test]
    async fn delete_cascades_to_agents() {
        let (manager, store) = manager();
        let id = manager
            .create_network("campaigns", "re-engagement", None)
            .await
            .unwrap();
        let view = manager.get_network(id).await.unwrap();

        assert!(manager.delete_network(id).await);
        assert!(manager.get_network(id).await.is_none());
        for agent in view.agents {
            assert!(store.get(&keys::agent(agent.id)).await.is_none());
        }
        // Second delete reports missing.
        assert!(!manager.delete_network(id).await);
    }

    #[tokio::test]
    async fn list_networks_skips_collection_keys() {
        let (manager, _) = manager();
        manager.create_network("one", "", None).await.unwrap();
        manager.create_network("two", "", None).await.unwrap();
        let networks = manager.list_networks().await;
        assert_eq!(networks.len(), 2);
    }
}
