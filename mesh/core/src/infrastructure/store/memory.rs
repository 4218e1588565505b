// Copyright (c) 2026 Relaymail, Inc.
// SPDX-License-Identifier: AGPL-3.0

//! In-process `SharedStore` implementation for development and testing.
//!
//! Carries the same breaker wrapping as the production backend so resilience
//! behavior can be exercised without a live store; `inject_disconnects`
//! schedules simulated connection drops for chaos-style tests.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};

use super::{SharedStore, StoreCommand, StoreHealth, Subscription};
use crate::infrastructure::breaker::{BreakerConfig, BreakerState, CircuitBreaker};

#[derive(Debug, Clone)]
enum StoreValue {
    Str(String),
    Hash(HashMap<String, String>),
    List(Vec<String>),
}

pub struct MemoryStore {
    values: DashMap<String, StoreValue>,
    events: broadcast::Sender<(String, String)>,
    breaker: CircuitBreaker,
    // Scripted connection drops, consumed one per operation; true = drop.
    faults: Mutex<VecDeque<bool>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_breaker(BreakerConfig::default())
    }

    pub fn with_breaker(config: BreakerConfig) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            values: DashMap::new(),
            events,
            breaker: CircuitBreaker::new("memory-store", config),
            faults: Mutex::new(VecDeque::new()),
        }
    }

    /// Schedule simulated connection drops for upcoming operations
    /// (`true` = the operation fails as if the connection dropped).
    pub fn inject_disconnects(&self, plan: impl IntoIterator<Item = bool>) {
        self.faults.lock().extend(plan);
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }

    /// Breaker gate shared by every operation: fail fast when open, consume
    /// one scheduled fault otherwise.
    fn admit(&self) -> bool {
        if !self.breaker.allow_request() {
            return false;
        }
        let dropped = self.faults.lock().pop_front().unwrap_or(false);
        if dropped {
            self.breaker.record_failure();
            false
        } else {
            self.breaker.record_success();
            true
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn glob_match(pattern: &str, key: &str) -> bool {
    if let Some(prefix) = pattern.strip_suffix('*') {
        key.starts_with(prefix)
    } else if let Some(suffix) = pattern.strip_prefix('*') {
        key.ends_with(suffix)
    } else {
        key == pattern
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn get(&self, key: &str) -> Option<String> {
        if !self.admit() {
            return None;
        }
        match self.values.get(key).map(|v| v.value().clone()) {
            Some(StoreValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    async fn set(&self, key: &str, value: &str) -> bool {
        if !self.admit() {
            return false;
        }
        self.values
            .insert(key.to_string(), StoreValue::Str(value.to_string()));
        true
    }

    async fn delete(&self, key: &str) -> bool {
        if !self.admit() {
            return false;
        }
        self.values.remove(key).is_some()
    }

    async fn keys(&self, pattern: &str) -> Vec<String> {
        if !self.admit() {
            return Vec::new();
        }
        self.values
            .iter()
            .map(|e| e.key().clone())
            .filter(|k| glob_match(pattern, k))
            .collect()
    }

    async fn hget(&self, key: &str, field: &str) -> Option<String> {
        if !self.admit() {
            return None;
        }
        match self.values.get(key).map(|v| v.value().clone()) {
            Some(StoreValue::Hash(h)) => h.get(field).cloned(),
            _ => None,
        }
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> bool {
        if !self.admit() {
            return false;
        }
        let mut entry = self
            .values
            .entry(key.to_string())
            .or_insert_with(|| StoreValue::Hash(HashMap::new()));
        match entry.value_mut() {
            StoreValue::Hash(h) => {
                h.insert(field.to_string(), value.to_string());
                true
            }
            _ => false,
        }
    }

    async fn hgetall(&self, key: &str) -> HashMap<String, String> {
        if !self.admit() {
            return HashMap::new();
        }
        match self.values.get(key).map(|v| v.value().clone()) {
            Some(StoreValue::Hash(h)) => h,
            _ => HashMap::new(),
        }
    }

    async fn lpush(&self, key: &str, value: &str) -> bool {
        if !self.admit() {
            return false;
        }
        self.push(key, value, true)
    }

    async fn rpush(&self, key: &str, value: &str) -> bool {
        if !self.admit() {
            return false;
        }
        self.push(key, value, false)
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> Vec<String> {
        if !self.admit() {
            return Vec::new();
        }
        let list = match self.values.get(key).map(|v| v.value().clone()) {
            Some(StoreValue::List(l)) => l,
            _ => return Vec::new(),
        };
        let len = list.len() as isize;
        if len == 0 {
            return Vec::new();
        }
        let normalize = |i: isize| if i < 0 { len + i } else { i };
        let start = normalize(start).max(0);
        let stop = normalize(stop).min(len - 1);
        if start > stop || start >= len {
            return Vec::new();
        }
        list[start as usize..=stop as usize].to_vec()
    }

    async fn publish(&self, channel: &str, payload: &str) -> bool {
        if !self.admit() {
            return false;
        }
        let _ = self
            .events
            .send((channel.to_string(), payload.to_string()));
        true
    }

    async fn subscribe(&self, channel: &str) -> Option<Subscription> {
        if !self.admit() {
            return None;
        }
        let mut feed = self.events.subscribe();
        let (tx, rx) = mpsc::channel(64);
        let wanted = channel.to_string();
        tokio::spawn(async move {
            while let Ok((chan, payload)) = feed.recv().await {
                if chan != wanted {
                    continue;
                }
                if tx.send(payload).await.is_err() {
                    break;
                }
            }
        });
        Some(Subscription::new(channel.to_string(), rx))
    }

    async fn pipeline(&self, commands: Vec<StoreCommand>) -> bool {
        // One admission check for the whole batch: a dropped pipeline is a
        // single failure against the breaker.
        if !self.admit() {
            return false;
        }
        for command in commands {
            match command {
                StoreCommand::Set { key, value } => {
                    self.values.insert(key, StoreValue::Str(value));
                }
                StoreCommand::Delete { key } => {
                    self.values.remove(&key);
                }
                StoreCommand::HSet { key, field, value } => {
                    let mut entry = self
                        .values
                        .entry(key)
                        .or_insert_with(|| StoreValue::Hash(HashMap::new()));
                    if let StoreValue::Hash(h) = entry.value_mut() {
                        h.insert(field, value);
                    }
                }
                StoreCommand::LPush { key, value } => {
                    self.push(&key, &value, true);
                }
                StoreCommand::RPush { key, value } => {
                    self.push(&key, &value, false);
                }
            }
        }
        true
    }

    async fn health(&self) -> StoreHealth {
        StoreHealth {
            connected: self.breaker.state() != BreakerState::Open,
            breaker: self.breaker.state(),
        }
    }
}

impl MemoryStore {
    fn push(&self, key: &str, value: &str, front: bool) -> bool {
        let mut entry = self
            .values
            .entry(key.to_string())
            .or_insert_with(|| StoreValue::List(Vec::new()));
        match entry.value_mut() {
            StoreValue::List(l) => {
                if front {
                    l.insert(0, value.to_string());
                } else {
                    l.push(value.to_string());
                }
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn string_roundtrip_and_delete() {
        let store = MemoryStore::new();
        assert!(store.set("mesh:test:a", "1").await);
        assert_eq!(store.get("mesh:test:a").await.as_deref(), Some("1"));
        assert!(store.delete("mesh:test:a").await);
        assert!(store.get("mesh:test:a").await.is_none());
        assert!(!store.delete("mesh:test:a").await);
    }

    #[tokio::test]
    async fn rpush_preserves_insertion_order() {
        let store = MemoryStore::new();
        store.rpush("mesh:test:list", "a").await;
        store.rpush("mesh:test:list", "b").await;
        store.lpush("mesh:test:list", "z").await;
        assert_eq!(
            store.lrange("mesh:test:list", 0, -1).await,
            vec!["z", "a", "b"]
        );
        assert_eq!(store.lrange("mesh:test:list", 1, 1).await, vec!["a"]);
    }

    #[tokio::test]
    async fn keys_glob_matches_prefix() {
        let store = MemoryStore::new();
        store.set("mesh:task:1", "x").await;
        store.set("mesh:task:2", "y").await;
        store.set("mesh:agent:1", "z").await;
        let mut keys = store.keys("mesh:task:*").await;
        keys.sort();
        assert_eq!(keys, vec!["mesh:task:1", "mesh:task:2"]);
    }

    #[tokio::test]
    async fn hash_fields_are_independent() {
        let store = MemoryStore::new();
        store.hset("mesh:test:h", "f1", "1").await;
        store.hset("mesh:test:h", "f2", "2").await;
        assert_eq!(store.hget("mesh:test:h", "f1").await.as_deref(), Some("1"));
        let all = store.hgetall("mesh:test:h").await;
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn publish_reaches_subscriber() {
        let store = MemoryStore::new();
        let mut sub = store.subscribe("mesh:events:n1").await.unwrap();
        store.publish("mesh:events:other", "nope").await;
        store.publish("mesh:events:n1", "hello").await;
        assert_eq!(sub.recv().await.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn injected_disconnects_return_neutral_values() {
        let store = MemoryStore::new();
        store.set("mesh:test:a", "1").await;
        store.inject_disconnects([true]);
        assert!(store.get("mesh:test:a").await.is_none());
        // Next operation succeeds again.
        assert_eq!(store.get("mesh:test:a").await.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn sustained_drops_open_the_breaker() {
        let store = MemoryStore::with_breaker(BreakerConfig {
            failure_threshold: 3,
            ..BreakerConfig::default()
        });
        store.inject_disconnects([true, true, true]);
        for _ in 0..3 {
            store.get("mesh:test:a").await;
        }
        assert_eq!(store.breaker_state(), BreakerState::Open);
        // Fail-fast: no fault scheduled, still neutral.
        assert!(!store.set("mesh:test:a", "1").await);
    }

    #[tokio::test]
    async fn pipeline_applies_all_commands() {
        let store = MemoryStore::new();
        let ok = store
            .pipeline(vec![
                StoreCommand::Set {
                    key: "mesh:test:doc".into(),
                    value: "{}".into(),
                },
                StoreCommand::RPush {
                    key: "mesh:test:list".into(),
                    value: "id-1".into(),
                },
            ])
            .await;
        assert!(ok);
        assert_eq!(store.get("mesh:test:doc").await.as_deref(), Some("{}"));
        assert_eq!(store.lrange("mesh:test:list", 0, -1).await, vec!["id-1"]);
    }
}
