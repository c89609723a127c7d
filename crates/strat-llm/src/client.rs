//! The generation capability interface consumed by the stage executors.

use async_trait::async_trait;

use crate::error::GenerationResult;

/// Prompt context for a single structured generation call.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// System instructions describing the task and output schema
    pub system_prompt: String,
    /// Accumulated pipeline context for this stage
    pub user_prompt: String,
    /// Model name; also selects the provider
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
}

impl GenerationRequest {
    pub fn new(
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            model: model.into(),
            temperature: 0.7,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Opaque structured-generation service.
///
/// Implementations return the raw JSON value produced by the model; the
/// calling stage owns deserialization and schema validation, so a parse
/// failure can be classified and retried by the coordinator rather than
/// inside the transport.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> GenerationResult<serde_json::Value>;
}
