// Copyright (c) 2026 Relaymail, Inc.
// SPDX-License-Identifier: AGPL-3.0
//! Append-only shared-memory entries backed by the store.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::domain::error::MeshError;
use crate::domain::memory::{MemoryEntry, MemoryId, MemoryKind};
use crate::domain::network::NetworkId;
use crate::infrastructure::store::{self, keys, SharedStore};

#[derive(Clone)]
pub struct MemoryLedger {
    store: Arc<dyn SharedStore>,
}

impl MemoryLedger {
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self { store }
    }

    /// Validate, persist, and append the id to the owning network's memory
    /// list. The append is store-native (`rpush`), never read-modify-write.
    pub async fn add_memory(
        &self,
        network_id: NetworkId,
        content: impl Into<String>,
        kind: MemoryKind,
        confidence: f64,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<MemoryId, MeshError> {
        if self.store.get(&keys::network(network_id)).await.is_none() {
            return Err(MeshError::not_found("network", network_id));
        }

        let entry = MemoryEntry::new(network_id, kind, content, confidence)?.with_metadata(metadata);
        store::put_json(self.store.as_ref(), &keys::memory(entry.id), &entry).await;
        self.store
            .rpush(&keys::network_memories(network_id), &entry.id.to_string())
            .await;
        debug!(network_id = %network_id, memory_id = %entry.id, "memory appended");
        Ok(entry.id)
    }

    pub async fn get_memory(&self, id: MemoryId) -> Result<MemoryEntry, MeshError> {
        store::get_json(self.store.as_ref(), &keys::memory(id))
            .await
            .ok_or_else(|| MeshError::not_found("memory", id))
    }

    /// All entries for a network, creation order.
    pub async fn get_network_memory(&self, network_id: NetworkId) -> Vec<MemoryEntry> {
        let ids = self
            .store
            .lrange(&keys::network_memories(network_id), 0, -1)
            .await;
        let mut entries = Vec::with_capacity(ids.len());
        for raw in ids {
            let Ok(id) = MemoryId::from_string(&raw) else {
                continue;
            };
            if let Some(entry) =
                store::get_json::<MemoryEntry>(self.store.as_ref(), &keys::memory(id)).await
            {
                entries.push(entry);
            }
        }
        entries
    }

    /// Case-insensitive keyword filter over `content`, lazily evaluated.
    /// Embedding similarity is a future upgrade, not part of the contract.
    pub async fn search_memories(
        &self,
        network_id: NetworkId,
        query: &str,
    ) -> impl Iterator<Item = MemoryEntry> {
        let needle = query.to_lowercase();
        self.get_network_memory(network_id)
            .await
            .into_iter()
            .filter(move |entry| entry.content.to_lowercase().contains(&needle))
    }

    /// Entries fed into delegation prompts: the most recent 50, ranked by
    /// confidence descending, truncated to `limit`.
    pub async fn select_for_prompt(&self, network_id: NetworkId, limit: usize) -> Vec<MemoryEntry> {
        let mut recent: Vec<MemoryEntry> = self
            .get_network_memory(network_id)
            .await
            .into_iter()
            .rev()
            .take(50)
            .collect();
        recent.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        recent.truncate(limit);
        recent
    }
}
