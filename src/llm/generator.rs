use std::sync::Arc;

use super::provider::LlmProvider;
use super::types::{ChatMessage, ChatRequest};
use crate::core::config::settings::ModelSettings;
use crate::core::errors::RagError;

/// Sends assembled prompts to the configured chat model.
#[derive(Clone)]
pub struct Generator {
    provider: Arc<dyn LlmProvider>,
    settings: ModelSettings,
}

impl Generator {
    pub fn new(provider: Arc<dyn LlmProvider>, settings: ModelSettings) -> Self {
        Self { provider, settings }
    }

    pub fn model(&self) -> &str {
        &self.settings.llm_model
    }

    pub async fn generate(&self, prompt: &str) -> Result<String, RagError> {
        let request =
            ChatRequest::new(vec![ChatMessage::user(prompt)]).with_settings(&self.settings);

        let started = std::time::Instant::now();
        let completion = self
            .provider
            .chat(request, &self.settings.llm_model)
            .await?;

        let answer = completion.trim();
        if answer.is_empty() {
            return Err(RagError::Generation(format!(
                "{} returned an empty completion",
                self.settings.llm_model
            )));
        }

        tracing::debug!(
            provider = self.provider.name(),
            model = %self.settings.llm_model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "generation finished"
        );
        Ok(answer.to_string())
    }
}
