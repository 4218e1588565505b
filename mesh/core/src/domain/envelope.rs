//! Response envelopes for model output.
//!
//! Every gateway response is parsed into one of the strict shapes below;
//! anything else is a `MeshError::MalformedResponse`, never a silent default.

use serde::{Deserialize, Serialize};

use crate::domain::agent::AgentId;
use crate::domain::error::MeshError;
use crate::domain::memory::MemoryKind;

/// Coordinator output: either delegate another round or declare completion,
/// discriminated by the `task_complete` field.
#[derive(Debug, Clone)]
pub enum CoordinatorDecision {
    Delegation(Delegation),
    Completion(Completion),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Delegation {
    pub reasoning: String,
    pub subtasks: Vec<SubtaskDirective>,
    #[serde(default)]
    pub new_memories: Vec<MemoryDirective>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubtaskDirective {
    pub agent_id: AgentId,
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Completion {
    pub reasoning: String,
    pub result: serde_json::Value,
    #[serde(default)]
    pub new_memories: Vec<MemoryDirective>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryDirective {
    #[serde(rename = "type")]
    pub kind: MemoryKind,
    pub content: String,
    pub confidence: f64,
}

/// Specialist output for one subtask.
#[derive(Debug, Clone, Deserialize)]
pub struct SpecialistReply {
    pub reasoning: String,
    pub result: serde_json::Value,
    pub confidence: f64,
    #[serde(default)]
    pub suggested_memories: Vec<MemoryDirective>,
}

impl CoordinatorDecision {
    pub fn parse(content: &str) -> Result<Self, MeshError> {
        let value: serde_json::Value = serde_json::from_str(strip_code_fence(content))
            .map_err(|e| MeshError::MalformedResponse(format!("invalid JSON: {e}")))?;

        let task_complete = value
            .get("task_complete")
            .and_then(|v| v.as_bool())
            .ok_or_else(|| {
                MeshError::MalformedResponse("missing boolean field `task_complete`".to_string())
            })?;

        if task_complete {
            let completion: Completion = serde_json::from_value(value)
                .map_err(|e| MeshError::MalformedResponse(format!("bad completion shape: {e}")))?;
            Ok(CoordinatorDecision::Completion(completion))
        } else {
            let delegation: Delegation = serde_json::from_value(value)
                .map_err(|e| MeshError::MalformedResponse(format!("bad delegation shape: {e}")))?;
            Ok(CoordinatorDecision::Delegation(delegation))
        }
    }
}

impl SpecialistReply {
    pub fn parse(content: &str) -> Result<Self, MeshError> {
        serde_json::from_str(strip_code_fence(content))
            .map_err(|e| MeshError::MalformedResponse(format!("bad specialist shape: {e}")))
    }
}

/// Models routinely wrap JSON in a markdown fence; accept that one deviation.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}
