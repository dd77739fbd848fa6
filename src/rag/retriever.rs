use super::embedder::Embedder;
use super::index::{RetrievedChunk, VectorIndex};
use crate::core::errors::RagError;

/// Top-k lookup using the same embedder that built the index.
#[derive(Clone)]
pub struct Retriever {
    embedder: Embedder,
    top_k: usize,
}

impl Retriever {
    pub fn new(embedder: Embedder, top_k: usize) -> Self {
        Self { embedder, top_k }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn embedder(&self) -> &Embedder {
        &self.embedder
    }

    pub async fn retrieve(
        &self,
        index: &VectorIndex,
        query: &str,
    ) -> Result<Vec<RetrievedChunk>, RagError> {
        if index.is_empty() {
            return index.search(&[], self.top_k);
        }

        let vector = self.embedder.embed_query(query).await?;
        let hits = index.search(&vector, self.top_k)?;

        tracing::debug!(
            hits = hits.len(),
            best_distance = hits.first().map(|h| h.distance),
            "retrieved context"
        );
        Ok(hits)
    }
}
