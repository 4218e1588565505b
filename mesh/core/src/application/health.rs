// Copyright (c) 2026 Relaymail, Inc.
// SPDX-License-Identifier: AGPL-3.0
//! Aggregate liveness/readiness view, consumed by the HTTP layer's probes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::llm::LlmGateway;
use crate::domain::task::{Task, TaskStatus};
use crate::infrastructure::breaker::BreakerState;
use crate::infrastructure::store::{self, keys, SharedStore};

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub store_connected: bool,
    pub breaker_state: BreakerState,
    pub llm_gateway_status: GatewayStatus,
    pub active_networks_count: usize,
    pub active_tasks_count: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayStatus {
    Healthy,
    Unhealthy,
}

pub struct HealthMonitor {
    store: Arc<dyn SharedStore>,
    gateway: Arc<dyn LlmGateway>,
}

impl HealthMonitor {
    pub fn new(store: Arc<dyn SharedStore>, gateway: Arc<dyn LlmGateway>) -> Self {
        Self { store, gateway }
    }

    pub async fn check_health(&self) -> HealthReport {
        let store_health = self.store.health().await;
        let llm_gateway_status = match self.gateway.health_check().await {
            Ok(()) => GatewayStatus::Healthy,
            Err(_) => GatewayStatus::Unhealthy,
        };

        let active_networks_count = self
            .store
            .keys(keys::NETWORK_PATTERN)
            .await
            .iter()
            .filter(|key| keys::network_id_from_key(key).is_some())
            .count();

        let mut active_tasks_count = 0;
        for key in self.store.keys(keys::TASK_PATTERN).await {
            if let Some(task) = store::get_json::<Task>(self.store.as_ref(), &key).await {
                if matches!(task.status, TaskStatus::Pending | TaskStatus::InProgress) {
                    active_tasks_count += 1;
                }
            }
        }

        HealthReport {
            store_connected: store_health.connected,
            breaker_state: store_health.breaker,
            llm_gateway_status,
            active_networks_count,
            active_tasks_count,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::llm::{GenerationRequest, GenerationResponse, LlmError};
    use crate::domain::network::Network;
    use crate::domain::task::Task;
    use crate::infrastructure::store::MemoryStore;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct HealthyGateway;

    #[async_trait]
    impl LlmGateway for HealthyGateway {
        async fn generate_text(
            &self,
            _request: GenerationRequest,
        ) -> Result<GenerationResponse, LlmError> {
            Err(LlmError::Provider("not under test".into()))
        }

        async fn health_check(&self) -> Result<(), LlmError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn counts_networks_and_active_tasks() {
        let store = Arc::new(MemoryStore::new());
        let network = Network::new("campaigns", "");
        store::put_json(store.as_ref(), &keys::network(network.id), &network).await;

        let mut active = Task::new(network.id, "a", HashMap::new(), 1, None, 10);
        active.begin();
        store::put_json(store.as_ref(), &keys::task(active.id), &active).await;

        let mut done = Task::new(network.id, "b", HashMap::new(), 1, None, 10);
        done.complete(serde_json::json!({}));
        store::put_json(store.as_ref(), &keys::task(done.id), &done).await;

        let monitor = HealthMonitor::new(store, Arc::new(HealthyGateway));
        let report = monitor.check_health().await;

        assert!(report.store_connected);
        assert_eq!(report.breaker_state, BreakerState::Closed);
        assert_eq!(report.llm_gateway_status, GatewayStatus::Healthy);
        assert_eq!(report.active_networks_count, 1);
        assert_eq!(report.active_tasks_count, 1);
    }
}
