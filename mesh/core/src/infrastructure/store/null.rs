// Copyright (c) 2026 Relaymail, Inc.
// SPDX-License-Identifier: AGPL-3.0

//! No-op `SharedStore` for environments without a reachable store. Every
//! operation returns its neutral value, so higher layers never special-case
//! "store absent".

use std::collections::HashMap;

use async_trait::async_trait;

use super::{SharedStore, StoreCommand, StoreHealth, Subscription};
use crate::infrastructure::breaker::BreakerState;

pub struct NullStore;

#[async_trait]
impl SharedStore for NullStore {
    async fn get(&self, _key: &str) -> Option<String> {
        None
    }

    async fn set(&self, _key: &str, _value: &str) -> bool {
        false
    }

    async fn delete(&self, _key: &str) -> bool {
        false
    }

    async fn keys(&self, _pattern: &str) -> Vec<String> {
        Vec::new()
    }

    async fn hget(&self, _key: &str, _field: &str) -> Option<String> {
        None
    }

    async fn hset(&self, _key: &str, _field: &str, _value: &str) -> bool {
        false
    }

    async fn hgetall(&self, _key: &str) -> HashMap<String, String> {
        HashMap::new()
    }

    async fn lpush(&self, _key: &str, _value: &str) -> bool {
        false
    }

    async fn rpush(&self, _key: &str, _value: &str) -> bool {
        false
    }

    async fn lrange(&self, _key: &str, _start: isize, _stop: isize) -> Vec<String> {
        Vec::new()
    }

    async fn publish(&self, _channel: &str, _payload: &str) -> bool {
        false
    }

    async fn subscribe(&self, _channel: &str) -> Option<Subscription> {
        None
    }

    async fn pipeline(&self, _commands: Vec<StoreCommand>) -> bool {
        false
    }

    async fn health(&self) -> StoreHealth {
        StoreHealth {
            connected: false,
            breaker: BreakerState::Open,
        }
    }
}
