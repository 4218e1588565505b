// Copyright (c) 2026 Relaymail, Inc.
// SPDX-License-Identifier: AGPL-3.0

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::network::NetworkId;
use crate::domain::task::TaskId;

/// Default model assigned to agents created without an explicit spec.
pub const DEFAULT_MODEL: &str = "gpt-4o";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(pub Uuid);

impl AgentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Specialist roles in the mesh. `Coordinator` decomposes tasks; the rest
/// execute subtasks in their own domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Coordinator,
    Content,
    Analytics,
    Personalization,
    Delivery,
    Governance,
}

impl AgentKind {
    pub const ALL: [AgentKind; 6] = [
        AgentKind::Coordinator,
        AgentKind::Content,
        AgentKind::Analytics,
        AgentKind::Personalization,
        AgentKind::Delivery,
        AgentKind::Governance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Coordinator => "coordinator",
            AgentKind::Content => "content",
            AgentKind::Analytics => "analytics",
            AgentKind::Personalization => "personalization",
            AgentKind::Delivery => "delivery",
            AgentKind::Governance => "governance",
        }
    }

    /// Capabilities advertised by default-topology agents of this kind.
    pub fn default_capabilities(&self) -> Vec<String> {
        let caps: &[&str] = match self {
            AgentKind::Coordinator => &["task_delegation", "synthesis"],
            AgentKind::Content => &["copywriting", "subject_lines", "email_body"],
            AgentKind::Analytics => &["segmentation", "campaign_metrics", "ab_testing"],
            AgentKind::Personalization => &["audience_targeting", "dynamic_content"],
            AgentKind::Delivery => &["send_time_optimization", "deliverability"],
            AgentKind::Governance => &["compliance", "brand_safety"],
        };
        caps.iter().map(|c| c.to_string()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Idle,
    Busy,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    /// Back-reference only; the network owns the agent, never the reverse.
    pub network_id: NetworkId,
    pub name: String,
    pub kind: AgentKind,
    pub model: String,
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
    pub capabilities: Vec<String>,
    pub status: AgentStatus,
    /// Last reported confidence, overwritten (not averaged) per response.
    pub confidence: f64,
    pub last_action: Option<String>,
    #[serde(default)]
    pub assigned_tasks: Vec<TaskId>,
    #[serde(default)]
    pub connections: Vec<AgentId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(
        network_id: NetworkId,
        name: impl Into<String>,
        kind: AgentKind,
        model: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: AgentId::new(),
            network_id,
            name: name.into(),
            kind,
            model: model.into(),
            parameters: HashMap::new(),
            capabilities: kind.default_capabilities(),
            status: AgentStatus::Idle,
            confidence: 1.0,
            last_action: None,
            assigned_tasks: Vec::new(),
            connections: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn mark_busy(&mut self, task_id: TaskId, action: impl Into<String>) {
        self.status = AgentStatus::Busy;
        self.last_action = Some(action.into());
        if !self.assigned_tasks.contains(&task_id) {
            self.assigned_tasks.push(task_id);
        }
        self.updated_at = Utc::now();
    }

    pub fn mark_idle(&mut self, task_id: TaskId) {
        self.status = AgentStatus::Idle;
        self.assigned_tasks.retain(|t| *t != task_id);
        self.updated_at = Utc::now();
    }

    pub fn mark_error(&mut self, action: impl Into<String>) {
        self.status = AgentStatus::Error;
        self.last_action = Some(action.into());
        self.updated_at = Utc::now();
    }

    /// Overwrite the confidence with the value reported by the latest
    /// response, clamped into [0, 1].
    pub fn set_confidence(&mut self, confidence: f64) {
        self.confidence = confidence.clamp(0.0, 1.0);
        self.updated_at = Utc::now();
    }
}

/// Caller-provided agent description for `create_network`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpec {
    pub name: String,
    pub kind: AgentKind,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

/// Build the default topology: one agent per kind, every specialist
/// connected to the coordinator and the coordinator connected to all.
pub fn default_topology(network_id: NetworkId) -> Vec<Agent> {
    let mut agents: Vec<Agent> = AgentKind::ALL
        .iter()
        .map(|kind| {
            Agent::new(
                network_id,
                format!("{}-agent", kind.as_str()),
                *kind,
                DEFAULT_MODEL,
            )
        })
        .collect();

    let coordinator_id = agents[0].id;
    let specialist_ids: Vec<AgentId> = agents[1..].iter().map(|a| a.id).collect();
    agents[0].connections = specialist_ids;
    for agent in &mut agents[1..] {
        agent.connections = vec![coordinator_id];
    }
    agents
}

/// Build agents from caller-provided specs.
pub fn topology_from_specs(network_id: NetworkId, specs: &[AgentSpec]) -> Vec<Agent> {
    specs
        .iter()
        .map(|spec| {
            let mut agent = Agent::new(network_id, spec.name.clone(), spec.kind, spec.model.clone());
            if !spec.capabilities.is_empty() {
                agent.capabilities = spec.capabilities.clone();
            }
            agent
        })
        .collect()
}
