//! Text → vector mapping through the configured embedding model.

use std::sync::Arc;

use crate::core::config::settings::ModelSettings;
use crate::core::errors::RagError;
use crate::llm::LlmProvider;

#[derive(Clone)]
pub struct Embedder {
    provider: Arc<dyn LlmProvider>,
    model: String,
    batch_size: usize,
}

impl Embedder {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>, batch_size: usize) -> Self {
        Self {
            provider,
            model: model.into(),
            batch_size: batch_size.max(1),
        }
    }

    pub fn from_settings(provider: Arc<dyn LlmProvider>, settings: &ModelSettings) -> Self {
        Self::new(
            provider,
            settings.embedding_model.clone(),
            settings.embedding_batch_size,
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| RagError::Embedding("no vector returned for query".to_string()))
    }

    /// Embeds in batches; every vector must share one dimension.
    pub async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let mut vectors = Vec::with_capacity(texts.len());
        let mut dimension: Option<usize> = None;

        for (batch_no, batch) in texts.chunks(self.batch_size).enumerate() {
            let embedded = self.embed_batch(batch).await?;
            for vector in embedded {
                match dimension {
                    None => dimension = Some(vector.len()),
                    Some(dim) if dim != vector.len() => {
                        return Err(RagError::Embedding(format!(
                            "inconsistent embedding dimension: expected {}, got {}",
                            dim,
                            vector.len()
                        )));
                    }
                    Some(_) => {}
                }
                vectors.push(vector);
            }
            tracing::debug!(batch = batch_no, embedded = vectors.len(), total = texts.len(), "embedded batch");
        }

        Ok(vectors)
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let vectors = self.provider.embed(batch, &self.model).await?;

        if vectors.len() != batch.len() {
            return Err(RagError::Embedding(format!(
                "expected {} vectors from {}, got {}",
                batch.len(),
                self.model,
                vectors.len()
            )));
        }
        if vectors.iter().any(|v| v.is_empty()) {
            return Err(RagError::Embedding(format!("{} returned an empty vector", self.model)));
        }

        Ok(vectors)
    }
}
