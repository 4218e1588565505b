// Event Bus - real-time progress broadcasting for the mesh.
//
// In-memory fan-out via tokio broadcast channels for in-process consumers
// (SSE/WebSocket bridges, observers); every event is also mirrored onto the
// store's pub/sub channel so other processes can follow along. Both paths
// are fire-and-forget: delivery failures are logged, never propagated.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::events::{EventBroadcaster, MeshEvent, TaskUpdateKind};
use crate::domain::network::NetworkId;
use crate::domain::task::TaskId;
use crate::infrastructure::store::{keys, SharedStore};

#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<MeshEvent>>,
    store: Arc<dyn SharedStore>,
}

impl EventBus {
    /// Capacity bounds how many events are buffered before old ones drop.
    pub fn new(store: Arc<dyn SharedStore>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
            store,
        }
    }

    pub fn with_default_capacity(store: Arc<dyn SharedStore>) -> Self {
        Self::new(store, 1000)
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe to events for a single task, filtering the rest out.
    pub fn subscribe_task(&self, task_id: TaskId) -> TaskEventReceiver {
        TaskEventReceiver {
            receiver: self.sender.subscribe(),
            task_id,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    async fn publish(&self, event: MeshEvent) {
        debug!(network_id = %event.network_id(), "publishing event");
        let receiver_count = self.sender.send(event.clone()).unwrap_or(0);
        if receiver_count == 0 {
            debug!("no in-process subscribers for event");
        }

        let channel = keys::events_channel(event.network_id());
        match serde_json::to_string(&event) {
            Ok(payload) => {
                if !self.store.publish(&channel, &payload).await {
                    debug!(channel, "store pub/sub unavailable, event not mirrored");
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize event"),
        }
    }
}

#[async_trait]
impl EventBroadcaster for EventBus {
    async fn broadcast_task_update(
        &self,
        network_id: NetworkId,
        task_id: TaskId,
        kind: TaskUpdateKind,
        payload: serde_json::Value,
    ) {
        self.publish(MeshEvent::TaskUpdate {
            network_id,
            task_id,
            kind,
            payload,
            at: Utc::now(),
        })
        .await;
    }

    async fn broadcast_network_update(&self, network_id: NetworkId, payload: serde_json::Value) {
        self.publish(MeshEvent::NetworkUpdate {
            network_id,
            payload,
            at: Utc::now(),
        })
        .await;
    }
}

pub struct EventReceiver {
    receiver: broadcast::Receiver<MeshEvent>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Result<MeshEvent, EventBusError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => EventBusError::Closed,
            broadcast::error::RecvError::Lagged(n) => {
                warn!("event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }

    pub fn try_recv(&mut self) -> Result<MeshEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Receiver yielding only updates for one task.
pub struct TaskEventReceiver {
    receiver: broadcast::Receiver<MeshEvent>,
    task_id: TaskId,
}

impl TaskEventReceiver {
    pub async fn recv(&mut self) -> Result<MeshEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(|e| match e {
                broadcast::error::RecvError::Closed => EventBusError::Closed,
                broadcast::error::RecvError::Lagged(n) => EventBusError::Lagged(n),
            })?;
            if let MeshEvent::TaskUpdate { task_id, .. } = &event {
                if *task_id == self.task_id {
                    return Ok(event);
                }
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::store::MemoryStore;
    use serde_json::json;

    fn bus() -> (EventBus, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (EventBus::new(store.clone(), 16), store)
    }

    #[tokio::test]
    async fn publish_reaches_in_process_subscriber() {
        let (bus, _) = bus();
        let mut receiver = bus.subscribe();
        let network_id = NetworkId::new();
        let task_id = TaskId::new();

        bus.broadcast_task_update(network_id, task_id, TaskUpdateKind::TaskStarted, json!({}))
            .await;

        match receiver.recv().await.unwrap() {
            MeshEvent::TaskUpdate { task_id: id, kind, .. } => {
                assert_eq!(id, task_id);
                assert_eq!(kind, TaskUpdateKind::TaskStarted);
            }
            other => panic!("wrong event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn task_filter_drops_other_tasks() {
        let (bus, _) = bus();
        let network_id = NetworkId::new();
        let wanted = TaskId::new();
        let other = TaskId::new();
        let mut receiver = bus.subscribe_task(wanted);

        bus.broadcast_task_update(network_id, other, TaskUpdateKind::TaskStarted, json!({}))
            .await;
        bus.broadcast_task_update(network_id, wanted, TaskUpdateKind::TaskCompleted, json!({}))
            .await;

        match receiver.recv().await.unwrap() {
            MeshEvent::TaskUpdate { task_id, kind, .. } => {
                assert_eq!(task_id, wanted);
                assert_eq!(kind, TaskUpdateKind::TaskCompleted);
            }
            other => panic!("wrong event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn events_are_mirrored_to_store_pubsub() {
        let (bus, store) = bus();
        let network_id = NetworkId::new();
        let mut sub = store
            .subscribe(&keys::events_channel(network_id))
            .await
            .unwrap();

        bus.broadcast_network_update(network_id, json!({"iterations": 1}))
            .await;

        let payload = sub.recv().await.unwrap();
        let event: MeshEvent = serde_json::from_str(&payload).unwrap();
        assert_eq!(event.network_id(), network_id);
    }

    #[tokio::test]
    async fn store_failure_never_aborts_broadcast() {
        let (bus, store) = bus();
        let mut receiver = bus.subscribe();
        store.inject_disconnects([true]);

        bus.broadcast_network_update(NetworkId::new(), json!({})).await;
        assert!(receiver.recv().await.is_ok());
    }
}
