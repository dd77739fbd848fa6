pub mod generator;
pub mod ollama;
pub mod openai_compat;
pub mod provider;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

pub use generator::Generator;
pub use provider::LlmProvider;
pub use types::{ChatMessage, ChatRequest};

use crate::core::config::settings::ModelSettings;
use crate::core::config::ProviderKind;

pub fn build_provider(settings: &ModelSettings) -> Arc<dyn LlmProvider> {
    let timeout = Duration::from_secs(settings.request_timeout_secs);
    match settings.provider {
        ProviderKind::Ollama => Arc::new(ollama::OllamaProvider::new(
            settings.base_url.clone(),
            timeout,
        )),
        ProviderKind::OpenaiCompat => Arc::new(openai_compat::OpenAiCompatProvider::new(
            settings.base_url.clone(),
            timeout,
        )),
    }
}
