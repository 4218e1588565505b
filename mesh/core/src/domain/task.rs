use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::agent::AgentId;
use crate::domain::network::NetworkId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    Reasoning,
    SubtaskAssigned,
    SubtaskResult,
    Synthesis,
    Error,
}

/// One append-only history record. History for a task is written by exactly
/// one `process_task` invocation at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub kind: HistoryKind,
    pub agent_id: AgentId,
    pub timestamp: DateTime<Utc>,
    pub content: String,
}

impl HistoryEntry {
    pub fn new(kind: HistoryKind, agent_id: AgentId, content: impl Into<String>) -> Self {
        Self {
            kind,
            agent_id,
            timestamp: Utc::now(),
            content: content.into(),
        }
    }
}

/// A coordinator-issued unit of delegated work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtaskSpec {
    pub agent_id: AgentId,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub network_id: NetworkId,
    pub description: String,
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
    pub priority: u8,
    pub deadline: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    pub iterations: u32,
    pub max_iterations: u32,
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub subtasks: Vec<SubtaskSpec>,
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(
        network_id: NetworkId,
        description: impl Into<String>,
        context: HashMap<String, serde_json::Value>,
        priority: u8,
        deadline: Option<DateTime<Utc>>,
        max_iterations: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::new(),
            network_id,
            description: description.into(),
            context,
            priority,
            deadline,
            status: TaskStatus::Pending,
            iterations: 0,
            max_iterations,
            result: None,
            subtasks: Vec::new(),
            dependencies: Vec::new(),
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn begin(&mut self) {
        self.status = TaskStatus::InProgress;
        self.touch();
    }

    pub fn record(&mut self, kind: HistoryKind, agent_id: AgentId, content: impl Into<String>) {
        self.history.push(HistoryEntry::new(kind, agent_id, content));
        self.touch();
    }

    pub fn complete(&mut self, result: serde_json::Value) {
        self.status = TaskStatus::Completed;
        self.result = Some(result);
        self.touch();
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.status = TaskStatus::Failed;
        self.result = Some(serde_json::Value::String(reason.into()));
        self.touch();
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_is_pending_with_empty_history() {
        let task = Task::new(NetworkId::new(), "draft a campaign", HashMap::new(), 1, None, 10);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.iterations, 0);
        assert!(task.history.is_empty());
        assert!(!task.is_terminal());
    }

    #[test]
    fn history_preserves_append_order() {
        let mut task = Task::new(NetworkId::new(), "draft a campaign", HashMap::new(), 1, None, 10);
        let coordinator = AgentId::new();
        let specialist = AgentId::new();

        task.record(HistoryKind::Reasoning, coordinator, "decompose");
        task.record(HistoryKind::SubtaskAssigned, specialist, "write copy");
        task.record(HistoryKind::SubtaskResult, specialist, "copy written");

        let kinds: Vec<HistoryKind> = task.history.iter().map(|h| h.kind).collect();
        assert_eq!(
            kinds,
            vec![
                HistoryKind::Reasoning,
                HistoryKind::SubtaskAssigned,
                HistoryKind::SubtaskResult
            ]
        );
    }

    #[test]
    fn fail_stores_explanation_and_is_terminal() {
        let mut task = Task::new(NetworkId::new(), "draft a campaign", HashMap::new(), 1, None, 2);
        task.begin();
        task.fail("iteration budget exhausted after 2 rounds");
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.is_terminal());
        assert!(task
            .result
            .as_ref()
            .and_then(|r| r.as_str())
            .unwrap()
            .contains("budget"));
    }
}
