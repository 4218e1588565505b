// Copyright (c) 2026 Relaymail, Inc.
// SPDX-License-Identifier: AGPL-3.0

// LLM Gateway Domain Interface (Anti-Corruption Layer)
//
// Abstracts the provider fleet behind a single capability; concrete provider
// adapters live outside this crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Domain interface for text generation.
#[async_trait]
pub trait LlmGateway: Send + Sync {
    async fn generate_text(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResponse, LlmError>;

    /// Check if the gateway is healthy and accessible.
    async fn health_check(&self) -> Result<(), LlmError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub system_prompt: Option<String>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            temperature: Some(0.7),
            max_tokens: Some(4096),
            system_prompt: None,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct GenerationResponse {
    /// Generated text; the coordinator parses this as a JSON envelope.
    pub content: String,

    /// Model used (e.g., "gpt-4o", "llama3.2").
    pub model: String,

    /// Provider that served the request (e.g., "openai", "ollama").
    pub provider: String,

    /// Token usage stats.
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Errors that can occur during gateway operations.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
