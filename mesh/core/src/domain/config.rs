// Copyright (c) 2026 Relaymail, Inc.
// SPDX-License-Identifier: AGPL-3.0
//! Node configuration, deserialized from `mesh-config.yaml` at startup.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeshConfig {
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub breaker: BreakerSettings,
    #[serde(default)]
    pub coordinator: CoordinatorSettings,
    #[serde(default)]
    pub events: EventSettings,
}

impl MeshConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    /// "redis" | "memory" | "null"
    #[serde(default = "default_store_backend")]
    pub backend: String,
    #[serde(default = "default_store_url")]
    pub url: String,
    #[serde(default = "default_op_timeout_ms")]
    pub op_timeout_ms: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            url: default_store_url(),
            op_timeout_ms: default_op_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSettings {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_reset_timeout_secs")]
    pub reset_timeout_secs: u64,
    #[serde(default = "default_half_open_timeout_secs")]
    pub half_open_timeout_secs: u64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            reset_timeout_secs: default_reset_timeout_secs(),
            half_open_timeout_secs: default_half_open_timeout_secs(),
        }
    }
}

/// Coordinator-local knobs. Iteration/time budgets live on each Network
/// document, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorSettings {
    /// Cap on concurrent specialist calls within one delegation round.
    #[serde(default = "default_subtask_concurrency")]
    pub subtask_concurrency: usize,
    /// How many shared-memory entries are fed into the delegation prompt.
    #[serde(default = "default_memory_context_limit")]
    pub memory_context_limit: usize,
    #[serde(default = "default_llm_timeout_secs")]
    pub llm_timeout_secs: u64,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            subtask_concurrency: default_subtask_concurrency(),
            memory_context_limit: default_memory_context_limit(),
            llm_timeout_secs: default_llm_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSettings {
    #[serde(default = "default_event_capacity")]
    pub capacity: usize,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            capacity: default_event_capacity(),
        }
    }
}

// Defaults
fn default_store_backend() -> String {
    "redis".to_string()
}
fn default_store_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}
fn default_op_timeout_ms() -> u64 {
    2_000
}
fn default_failure_threshold() -> u32 {
    5
}
fn default_reset_timeout_secs() -> u64 {
    30
}
fn default_half_open_timeout_secs() -> u64 {
    5
}
fn default_subtask_concurrency() -> usize {
    4
}
fn default_memory_context_limit() -> usize {
    5
}
fn default_llm_timeout_secs() -> u64 {
    60
}
fn default_event_capacity() -> usize {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_yields_defaults() {
        let config = MeshConfig::from_yaml("{}").unwrap();
        assert_eq!(config.store.backend, "redis");
        assert_eq!(config.breaker.failure_threshold, 5);
        assert_eq!(config.coordinator.subtask_concurrency, 4);
        assert_eq!(config.events.capacity, 1000);
    }

    #[test]
    fn partial_yaml_overrides_only_named_fields() {
        let yaml = r#"
store:
  backend: memory
coordinator:
  subtask_concurrency: 2
"#;
        let config = MeshConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.store.backend, "memory");
        assert_eq!(config.store.op_timeout_ms, 2_000);
        assert_eq!(config.coordinator.subtask_concurrency, 2);
        assert_eq!(config.coordinator.llm_timeout_secs, 60);
    }
}
