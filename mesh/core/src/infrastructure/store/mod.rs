// Copyright (c) 2026 Relaymail, Inc.
// SPDX-License-Identifier: AGPL-3.0

//! Shared-store access layer.
//!
//! The `SharedStore` port is the single source of truth for every mesh
//! document. Per the fail-fast policy, operations return **neutral values**
//! (`None`, `false`, empty collections) instead of errors when the store is
//! degraded: connectivity failures are absorbed by the circuit breaker and
//! never propagate to the coordination layer.
//!
//! # Available Implementations
//!
//! - **RedisStore**: production backend; breaker-wrapped, per-call timeout,
//!   reconnecting connection, pipelined writes
//! - **MemoryStore**: full in-process implementation for development and
//!   testing
//! - **NullStore**: benign no-ops for store-absent environments

pub mod memory;
pub mod null;
pub mod redis;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;

use crate::domain::config::StoreSettings;
use crate::infrastructure::breaker::{BreakerConfig, BreakerState};

pub use self::memory::MemoryStore;
pub use self::null::NullStore;
pub use self::redis::{RedisConfig, RedisStore};

/// Commands accepted by `SharedStore::pipeline`.
#[derive(Debug, Clone)]
pub enum StoreCommand {
    Set { key: String, value: String },
    Delete { key: String },
    HSet { key: String, field: String, value: String },
    LPush { key: String, value: String },
    RPush { key: String, value: String },
}

/// A live pub/sub subscription. Dropping it ends the subscription.
pub struct Subscription {
    channel: String,
    rx: mpsc::Receiver<String>,
}

impl Subscription {
    pub(crate) fn new(channel: String, rx: mpsc::Receiver<String>) -> Self {
        Self { channel, rx }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Next published payload, or `None` once the feed is gone.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreHealth {
    pub connected: bool,
    pub breaker: BreakerState,
}

/// Resilient key/hash/list/pub-sub primitives over the shared store.
///
/// `keys` supports only the glob forms the key scheme needs: a literal key,
/// `prefix*`, or `*suffix`.
#[async_trait]
pub trait SharedStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn set(&self, key: &str, value: &str) -> bool;
    async fn delete(&self, key: &str) -> bool;
    async fn keys(&self, pattern: &str) -> Vec<String>;

    async fn hget(&self, key: &str, field: &str) -> Option<String>;
    async fn hset(&self, key: &str, field: &str, value: &str) -> bool;
    async fn hgetall(&self, key: &str) -> HashMap<String, String>;

    async fn lpush(&self, key: &str, value: &str) -> bool;
    async fn rpush(&self, key: &str, value: &str) -> bool;
    /// Inclusive range; negative indexes count from the tail, `-1` = last.
    async fn lrange(&self, key: &str, start: isize, stop: isize) -> Vec<String>;

    async fn publish(&self, channel: &str, payload: &str) -> bool;
    async fn subscribe(&self, channel: &str) -> Option<Subscription>;

    /// Batch N commands into one round-trip. A failed pipeline counts as
    /// exactly one failure against the breaker, not N.
    async fn pipeline(&self, commands: Vec<StoreCommand>) -> bool;

    async fn health(&self) -> StoreHealth;
}

/// Read a JSON document stored at `key`.
pub async fn get_json<T: DeserializeOwned>(store: &dyn SharedStore, key: &str) -> Option<T> {
    let raw = store.get(key).await?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key, error = %e, "corrupt document in store");
            None
        }
    }
}

/// Write a JSON document at `key`.
pub async fn put_json<T: Serialize>(store: &dyn SharedStore, key: &str, value: &T) -> bool {
    match serde_json::to_string(value) {
        Ok(raw) => store.set(key, &raw).await,
        Err(e) => {
            warn!(key, error = %e, "failed to serialize document");
            false
        }
    }
}

/// Backend selection, resolved from configuration at startup.
#[derive(Debug, Clone)]
pub enum StoreBackend {
    Redis(RedisConfig),
    InMemory,
    Null,
}

impl StoreBackend {
    pub fn from_settings(settings: &StoreSettings) -> anyhow::Result<Self> {
        match settings.backend.as_str() {
            "redis" => Ok(StoreBackend::Redis(RedisConfig::from_settings(settings))),
            "memory" => Ok(StoreBackend::InMemory),
            "null" => Ok(StoreBackend::Null),
            other => anyhow::bail!("unknown store backend '{other}'"),
        }
    }
}

/// Build the configured store. Connections are established lazily on first
/// use, so this never blocks startup on an unreachable store.
pub fn connect(backend: StoreBackend, breaker: BreakerConfig) -> anyhow::Result<Arc<dyn SharedStore>> {
    Ok(match backend {
        StoreBackend::Redis(config) => Arc::new(RedisStore::new(config, breaker)?),
        StoreBackend::InMemory => Arc::new(MemoryStore::with_breaker(breaker)),
        StoreBackend::Null => Arc::new(NullStore),
    })
}

/// Key scheme: one stable, collision-free prefix per entity type.
pub mod keys {
    use crate::domain::agent::AgentId;
    use crate::domain::memory::MemoryId;
    use crate::domain::network::NetworkId;
    use crate::domain::task::TaskId;

    pub const NETWORK_PATTERN: &str = "mesh:network:*";
    pub const TASK_PATTERN: &str = "mesh:task:*";

    pub fn network(id: NetworkId) -> String {
        format!("mesh:network:{id}")
    }

    /// Recover a network id from a document key; collection-list keys
    /// (`...:agents` etc.) yield `None`.
    pub fn network_id_from_key(key: &str) -> Option<NetworkId> {
        let rest = key.strip_prefix("mesh:network:")?;
        if rest.contains(':') {
            return None;
        }
        NetworkId::from_string(rest).ok()
    }

    /// Append-only list of agent ids registered on the network.
    pub fn network_agents(id: NetworkId) -> String {
        format!("mesh:network:{id}:agents")
    }

    /// Append-only list of task ids, insertion order.
    pub fn network_tasks(id: NetworkId) -> String {
        format!("mesh:network:{id}:tasks")
    }

    /// Append-only list of memory ids, creation order.
    pub fn network_memories(id: NetworkId) -> String {
        format!("mesh:network:{id}:memories")
    }

    pub fn agent(id: AgentId) -> String {
        format!("mesh:agent:{id}")
    }

    pub fn task(id: TaskId) -> String {
        format!("mesh:task:{id}")
    }

    pub fn memory(id: MemoryId) -> String {
        format!("mesh:memory:{id}")
    }

    /// Pub/sub channel carrying progress events for one network.
    pub fn events_channel(id: NetworkId) -> String {
        format!("mesh:events:{id}")
    }
}
