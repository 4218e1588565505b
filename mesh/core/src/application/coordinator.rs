//! Task lifecycle and the delegation loop.
//!
//! One `process_task` call drives a task through delegation rounds:
//! analyze → delegate-or-complete → collect specialist results → persist.
//! The coordinator agent decides each round via the gateway; specialists run
//! their subtasks with bounded fan-out. All history/iteration mutations for
//! a task happen inside this single call (single-writer-per-task), and all
//! collection appends on the network use store-native list pushes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::domain::agent::{Agent, AgentKind};
use crate::domain::config::CoordinatorSettings;
use crate::domain::envelope::{
    CoordinatorDecision, MemoryDirective, SpecialistReply, SubtaskDirective,
};
use crate::domain::error::MeshError;
use crate::domain::events::{EventBroadcaster, TaskUpdateKind};
use crate::domain::llm::{GenerationRequest, LlmGateway};
use crate::domain::memory::MemoryEntry;
use crate::domain::network::{Network, NetworkId};
use crate::domain::task::{HistoryKind, Task, TaskId, TaskStatus};
use crate::infrastructure::ledger::MemoryLedger;
use crate::infrastructure::registry::AgentRegistry;
use crate::infrastructure::store::{self, keys, SharedStore, StoreCommand};

const STRICT_FORMAT_REMINDER: &str = "Your previous reply was not valid JSON. Respond with a \
single JSON object matching the requested schema exactly: no prose, no markdown fence, no \
trailing commentary.";

pub struct Coordinator {
    store: Arc<dyn SharedStore>,
    registry: AgentRegistry,
    ledger: MemoryLedger,
    gateway: Arc<dyn LlmGateway>,
    events: Arc<dyn EventBroadcaster>,
    settings: CoordinatorSettings,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn SharedStore>,
        gateway: Arc<dyn LlmGateway>,
        events: Arc<dyn EventBroadcaster>,
        settings: CoordinatorSettings,
    ) -> Self {
        let registry = AgentRegistry::new(store.clone());
        let ledger = MemoryLedger::new(store.clone());
        Self {
            store,
            registry,
            ledger,
            gateway,
            events,
            settings,
        }
    }

    // ========================================================================
    // Task lifecycle
    // ========================================================================

    /// Create a pending task and append its id to the network's task list.
    /// The append is a store-native push, so concurrent submissions against
    /// the same network never lose updates.
    pub async fn submit_task(
        &self,
        network_id: NetworkId,
        description: impl Into<String>,
        context: HashMap<String, serde_json::Value>,
        priority: u8,
        deadline: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<TaskId, MeshError> {
        let network: Network = store::get_json(self.store.as_ref(), &keys::network(network_id))
            .await
            .ok_or_else(|| MeshError::not_found("network", network_id))?;

        let task = Task::new(
            network_id,
            description,
            context,
            priority,
            deadline,
            network.max_iterations,
        );

        let committed = self
            .store
            .pipeline(vec![
                StoreCommand::Set {
                    key: keys::task(task.id),
                    value: serde_json::to_string(&task)?,
                },
                StoreCommand::RPush {
                    key: keys::network_tasks(network_id),
                    value: task.id.to_string(),
                },
            ])
            .await;
        if !committed {
            return Err(MeshError::Connectivity(
                "store rejected task submission".to_string(),
            ));
        }

        info!(network_id = %network_id, task_id = %task.id, "task submitted");
        Ok(task.id)
    }

    /// Pure read, used for polling.
    pub async fn get_task(&self, id: TaskId) -> Option<Task> {
        store::get_json(self.store.as_ref(), &keys::task(id)).await
    }

    /// Drive a task to a terminal state. Re-invoking on an already-terminal
    /// task is a no-op returning the stored outcome.
    pub async fn process_task(
        &self,
        network_id: NetworkId,
        task_id: TaskId,
    ) -> Result<Task, MeshError> {
        let mut task = self
            .get_task(task_id)
            .await
            .ok_or_else(|| MeshError::not_found("task", task_id))?;
        if task.network_id != network_id {
            return Err(MeshError::not_found("task", task_id));
        }
        if task.is_terminal() {
            debug!(task_id = %task_id, "task already terminal, returning stored outcome");
            return Ok(task);
        }

        let network: Network = store::get_json(self.store.as_ref(), &keys::network(network_id))
            .await
            .ok_or_else(|| MeshError::not_found("network", network_id))?;
        let coordinator = self.registry.coordinator_for(network_id).await?;

        let started = tokio::time::Instant::now();
        let budget = Duration::from_secs(network.timeout_seconds);

        if task.status == TaskStatus::Pending {
            task.begin();
            self.persist_task(&task).await;
            self.events
                .broadcast_task_update(
                    network_id,
                    task_id,
                    TaskUpdateKind::TaskStarted,
                    json!({ "description": task.description }),
                )
                .await;
        }

        while !task.is_terminal()
            && task.iterations < task.max_iterations
            && started.elapsed() < budget
        {
            self.run_round(&network, &coordinator, &mut task).await;

            if task.is_terminal() {
                break;
            }
            task.iterations += 1;
            task.touch();
            self.persist_task(&task).await;
            self.events
                .broadcast_network_update(
                    network_id,
                    json!({ "task_id": task_id, "iterations": task.iterations }),
                )
                .await;
        }

        if !task.is_terminal() {
            let reason = if task.iterations >= task.max_iterations {
                format!(
                    "iteration budget exhausted: {} rounds completed without a synthesis",
                    task.iterations
                )
            } else {
                format!(
                    "time budget exhausted: {}s elapsed without a synthesis",
                    network.timeout_seconds
                )
            };
            warn!(task_id = %task_id, %reason, "task failed");
            task.fail(reason);
            self.persist_task(&task).await;
            self.events
                .broadcast_task_update(
                    network_id,
                    task_id,
                    TaskUpdateKind::TaskFailed,
                    json!({ "result": task.result }),
                )
                .await;
        }

        Ok(task)
    }

    // ========================================================================
    // Delegation rounds
    // ========================================================================

    /// One round: ask the coordinator agent to delegate or complete, then
    /// run any delegated subtasks. Leaves the task terminal on completion or
    /// on an unrecoverable coordinator failure.
    async fn run_round(&self, network: &Network, coordinator: &Agent, task: &mut Task) {
        let roster: Vec<Agent> = self
            .registry
            .list_for_network(network.id)
            .await
            .into_iter()
            .filter(|a| a.kind != AgentKind::Coordinator)
            .collect();
        let memory_block = self.memory_block(network.id).await;
        let prompt = delegation_prompt(network, task, &roster, &memory_block);

        let decision = match self
            .call_envelope(&coordinator.model, &prompt, CoordinatorDecision::parse)
            .await
        {
            Ok(decision) => decision,
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "coordinator step failed");
                let _ = self
                    .registry
                    .mark_error(coordinator.id, "coordinator step failed")
                    .await;
                task.record(
                    HistoryKind::Error,
                    coordinator.id,
                    format!("coordinator step failed: {e}"),
                );
                task.fail(format!("coordinator step failed: {e}"));
                self.persist_task(task).await;
                self.events
                    .broadcast_task_update(
                        network.id,
                        task.id,
                        TaskUpdateKind::TaskFailed,
                        json!({ "result": task.result }),
                    )
                    .await;
                return;
            }
        };

        match decision {
            CoordinatorDecision::Completion(completion) => {
                task.record(
                    HistoryKind::Reasoning,
                    coordinator.id,
                    completion.reasoning.as_str(),
                );
                task.record(
                    HistoryKind::Synthesis,
                    coordinator.id,
                    completion.result.to_string(),
                );
                self.commit_memories(network.id, &completion.new_memories).await;

                task.complete(completion.result);
                self.persist_task(task).await;
                info!(task_id = %task.id, iterations = task.iterations, "task completed");
                self.events
                    .broadcast_task_update(
                        network.id,
                        task.id,
                        TaskUpdateKind::TaskCompleted,
                        json!({ "result": task.result }),
                    )
                    .await;
            }
            CoordinatorDecision::Delegation(delegation) => {
                task.record(
                    HistoryKind::Reasoning,
                    coordinator.id,
                    delegation.reasoning.as_str(),
                );
                self.commit_memories(network.id, &delegation.new_memories).await;
                self.run_subtasks(network, task, &delegation.subtasks, &memory_block)
                    .await;
            }
        }
    }

    /// Execute one round's subtasks. Gateway calls fan out with bounded
    /// concurrency; every task/agent mutation happens serially, in subtask
    /// declaration order.
    async fn run_subtasks(
        &self,
        network: &Network,
        task: &mut Task,
        subtasks: &[SubtaskDirective],
        memory_block: &str,
    ) {
        let mut assignments: Vec<(Agent, &SubtaskDirective)> = Vec::new();
        for subtask in subtasks {
            match self.registry.get(subtask.agent_id).await {
                Ok(agent) => assignments.push((agent, subtask)),
                Err(e) => {
                    warn!(agent_id = %subtask.agent_id, "delegated to unknown agent");
                    task.record(
                        HistoryKind::Error,
                        subtask.agent_id,
                        format!("subtask dropped: {e}"),
                    );
                }
            }
        }

        for (agent, subtask) in &assignments {
            let _ = self
                .registry
                .mark_busy(agent.id, task.id, &subtask.description)
                .await;
            task.record(
                HistoryKind::SubtaskAssigned,
                agent.id,
                subtask.description.as_str(),
            );
            self.events
                .broadcast_task_update(
                    network.id,
                    task.id,
                    TaskUpdateKind::SubtaskStarted,
                    json!({ "agent_id": agent.id, "description": subtask.description }),
                )
                .await;
            self.events
                .broadcast_task_update(
                    network.id,
                    task.id,
                    TaskUpdateKind::AgentStatusChanged,
                    json!({ "agent_id": agent.id, "status": "busy" }),
                )
                .await;
        }

        let prompts: Vec<String> = assignments
            .iter()
            .map(|(_, subtask)| specialist_prompt(task, subtask, memory_block))
            .collect();
        let cap = self
            .settings
            .subtask_concurrency
            .max(1)
            .min(assignments.len().max(1));
        let mut replies: Vec<(usize, Result<SpecialistReply, MeshError>)> =
            stream::iter(assignments.iter().enumerate().map(|(idx, (agent, _))| {
                let prompt = prompts[idx].as_str();
                async move {
                    let reply = self
                        .call_envelope(&agent.model, prompt, SpecialistReply::parse)
                        .await;
                    (idx, reply)
                }
            }))
            .buffer_unordered(cap)
            .collect()
            .await;
        replies.sort_by_key(|(idx, _)| *idx);

        for (idx, reply) in replies {
            let (agent, subtask) = &assignments[idx];
            match reply {
                Ok(reply) => {
                    task.record(HistoryKind::SubtaskResult, agent.id, reply.result.to_string());
                    let _ = self
                        .registry
                        .mark_idle(agent.id, task.id, Some(reply.confidence))
                        .await;
                    self.commit_memories(network.id, &reply.suggested_memories).await;
                    self.events
                        .broadcast_task_update(
                            network.id,
                            task.id,
                            TaskUpdateKind::SubtaskCompleted,
                            json!({
                                "agent_id": agent.id,
                                "confidence": reply.confidence,
                                "result": reply.result,
                            }),
                        )
                        .await;
                }
                Err(e) => {
                    warn!(agent_id = %agent.id, error = %e, "subtask failed");
                    task.record(
                        HistoryKind::Error,
                        agent.id,
                        format!("subtask failed: {e}"),
                    );
                    let _ = self
                        .registry
                        .mark_error(agent.id, &subtask.description)
                        .await;
                }
            }
            self.events
                .broadcast_task_update(
                    network.id,
                    task.id,
                    TaskUpdateKind::AgentStatusChanged,
                    json!({ "agent_id": agent.id }),
                )
                .await;
        }
    }

    // ========================================================================
    // Gateway plumbing
    // ========================================================================

    /// Bounded-wait gateway call with strict envelope parsing. A malformed
    /// reply is retried once with a stricter format reminder, then the step
    /// fails.
    async fn call_envelope<T>(
        &self,
        model: &str,
        prompt: &str,
        parse: fn(&str) -> Result<T, MeshError>,
    ) -> Result<T, MeshError> {
        let content = self.generate(model, prompt, None).await?;
        match parse(&content) {
            Ok(envelope) => Ok(envelope),
            Err(first_error) => {
                debug!(error = %first_error, "malformed reply, retrying with strict prompt");
                let content = self
                    .generate(model, prompt, Some(STRICT_FORMAT_REMINDER))
                    .await?;
                parse(&content).map_err(|_| first_error)
            }
        }
    }

    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        system_prompt: Option<&str>,
    ) -> Result<String, MeshError> {
        let mut request = GenerationRequest::new(prompt, model);
        if let Some(system_prompt) = system_prompt {
            request = request.with_system_prompt(system_prompt);
        }

        let timeout = Duration::from_secs(self.settings.llm_timeout_secs);
        match tokio::time::timeout(timeout, self.gateway.generate_text(request)).await {
            Ok(Ok(response)) => Ok(response.content),
            Ok(Err(e)) => Err(MeshError::Gateway(e.to_string())),
            Err(_) => Err(MeshError::Timeout(timeout)),
        }
    }

    // ========================================================================
    // Shared memory
    // ========================================================================

    async fn memory_block(&self, network_id: NetworkId) -> String {
        let entries = self
            .ledger
            .select_for_prompt(network_id, self.settings.memory_context_limit)
            .await;
        render_memories(&entries)
    }

    /// Commit reported memories; a directive that fails validation is logged
    /// and skipped, never fatal to the round.
    async fn commit_memories(&self, network_id: NetworkId, directives: &[MemoryDirective]) {
        for directive in directives {
            if let Err(e) = self
                .ledger
                .add_memory(
                    network_id,
                    directive.content.clone(),
                    directive.kind,
                    directive.confidence,
                    HashMap::new(),
                )
                .await
            {
                warn!(error = %e, "dropping invalid memory directive");
            }
        }
    }

    async fn persist_task(&self, task: &Task) {
        store::put_json(self.store.as_ref(), &keys::task(task.id), task).await;
    }
}

// ============================================================================
// Prompt composition
// ============================================================================

fn render_memories(entries: &[MemoryEntry]) -> String {
    if entries.is_empty() {
        return "(no shared memory yet)".to_string();
    }
    entries
        .iter()
        .map(|m| {
            format!(
                "- [{:?}, confidence {:.2}] {}",
                m.kind, m.confidence, m.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn delegation_prompt(network: &Network, task: &Task, roster: &[Agent], memory_block: &str) -> String {
    let roster_block = roster
        .iter()
        .map(|a| {
            format!(
                "- id: {} kind: {} status: {:?} capabilities: {}",
                a.id,
                a.kind.as_str(),
                a.status,
                a.capabilities.join(", ")
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    let context = serde_json::to_string(&task.context).unwrap_or_else(|_| "{}".to_string());

    format!(
        "You coordinate the \"{name}\" agent network.\n\
         Task: {description}\n\
         Context: {context}\n\n\
         Shared memory:\n{memory_block}\n\n\
         Available specialists:\n{roster_block}\n\n\
         Either delegate subtasks or declare the task complete. Reply with one JSON object:\n\
         {{\"task_complete\": false, \"reasoning\": \"...\", \"subtasks\": \
         [{{\"agent_id\": \"<id from the roster>\", \"description\": \"...\"}}], \
         \"new_memories\": [{{\"type\": \"fact|context|decision\", \"content\": \"...\", \
         \"confidence\": 0.0}}]}}\n\
         or\n\
         {{\"task_complete\": true, \"reasoning\": \"...\", \"result\": {{...}}, \
         \"new_memories\": [...]}}",
        name = network.name,
        description = task.description,
    )
}

fn specialist_prompt(task: &Task, subtask: &SubtaskDirective, memory_block: &str) -> String {
    let context = serde_json::to_string(&task.context).unwrap_or_else(|_| "{}".to_string());
    format!(
        "You are a specialist agent in an email-marketing mesh.\n\
         Overall task: {description}\n\
         Your subtask: {subtask}\n\
         Context: {context}\n\n\
         Shared memory:\n{memory_block}\n\n\
         Reply with one JSON object:\n\
         {{\"reasoning\": \"...\", \"result\": {{...}}, \"confidence\": 0.0, \
         \"suggested_memories\": [{{\"type\": \"fact|context|decision\", \"content\": \"...\", \
         \"confidence\": 0.0}}]}}",
        description = task.description,
        subtask = subtask.description,
    )
}
