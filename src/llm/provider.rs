use async_trait::async_trait;

use super::types::ChatRequest;
use crate::core::errors::RagError;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// return the provider name (e.g. "ollama", "openai_compat")
    fn name(&self) -> &str;

    /// check if the provider is reachable
    async fn health_check(&self) -> Result<bool, RagError>;

    /// chat completion (non-streaming); failures are `RagError::Generation`
    async fn chat(&self, request: ChatRequest, model_id: &str) -> Result<String, RagError>;

    /// one vector per input, in order; failures are `RagError::Embedding`
    async fn embed(&self, inputs: &[String], model_id: &str) -> Result<Vec<Vec<f32>>, RagError>;
}
