//! Build-time pipeline: load → chunk → embed → index → disk.

pub mod chunker;
pub mod loader;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::core::config::{DistanceMetric, Settings};
use crate::core::errors::RagError;
use crate::llm::LlmProvider;
use crate::rag::{Embedder, IndexEntry, VectorIndex};
use chunker::Chunker;
use loader::DocumentLoader;

#[derive(Debug, Clone, Serialize)]
pub struct LoadFailure {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub source_dir: PathBuf,
    pub index_path: PathBuf,
    pub files_loaded: usize,
    pub documents: usize,
    pub chunks: usize,
    pub skipped_files: Vec<PathBuf>,
    pub failures: Vec<LoadFailure>,
    pub embedding_model: String,
    pub dimension: usize,
    pub elapsed_ms: u64,
}

#[derive(Clone)]
pub struct IngestPipeline {
    loader: DocumentLoader,
    chunker: Chunker,
    embedder: Embedder,
    metric: DistanceMetric,
}

impl IngestPipeline {
    pub fn new(chunker: Chunker, embedder: Embedder, metric: DistanceMetric) -> Self {
        Self {
            loader: DocumentLoader::new(),
            chunker,
            embedder,
            metric,
        }
    }

    pub fn from_settings(
        settings: &Settings,
        provider: Arc<dyn LlmProvider>,
    ) -> Result<Self, RagError> {
        let chunker = Chunker::new(settings.rag.chunk_size, settings.rag.chunk_overlap)?;
        let embedder = Embedder::from_settings(provider, &settings.models);
        Ok(Self::new(chunker, embedder, settings.rag.distance))
    }

    pub fn embedding_model(&self) -> &str {
        self.embedder.model()
    }

    /// Rebuilds the index from `source_dir` and saves it to `index_path`.
    /// The file at `index_path` is only replaced once the new index is complete.
    pub async fn run(
        &self,
        source_dir: &Path,
        index_path: &Path,
    ) -> Result<(VectorIndex, IngestReport), RagError> {
        let started = Instant::now();
        tracing::info!(source_dir = %source_dir.display(), "ingestion started");

        let loader = self.loader.clone();
        let dir = source_dir.to_path_buf();
        let loaded = tokio::task::spawn_blocking(move || loader.load_dir(&dir))
            .await
            .map_err(RagError::storage)?;

        let failures: Vec<LoadFailure> = loaded
            .failures
            .iter()
            .map(|err| match err {
                RagError::Load { path, reason } => LoadFailure {
                    path: path.clone(),
                    reason: reason.clone(),
                },
                other => LoadFailure {
                    path: source_dir.to_path_buf(),
                    reason: other.to_string(),
                },
            })
            .collect();

        if loaded.documents.is_empty() {
            for failure in &failures {
                tracing::warn!(path = %failure.path.display(), reason = %failure.reason, "load failure");
            }
            return Err(RagError::NoDocuments(source_dir.to_path_buf()));
        }

        let chunks: Vec<_> = loaded
            .documents
            .iter()
            .flat_map(|doc| self.chunker.split_document(doc))
            .collect();
        tracing::info!(
            documents = loaded.documents.len(),
            chunks = chunks.len(),
            "documents chunked"
        );

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed_documents(&texts).await?;

        let entries = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexEntry { chunk, vector })
            .collect();
        let mut index = VectorIndex::build(entries, self.embedder.model(), self.metric)?;
        index.save(index_path).await?;

        if !failures.is_empty() {
            tracing::warn!(count = failures.len(), "some files could not be loaded");
            for failure in &failures {
                tracing::warn!(path = %failure.path.display(), reason = %failure.reason, "load failure");
            }
        }

        let report = IngestReport {
            source_dir: source_dir.to_path_buf(),
            index_path: index_path.to_path_buf(),
            files_loaded: loaded.files_loaded,
            documents: loaded.documents.len(),
            chunks: index.len(),
            skipped_files: loaded.skipped,
            failures,
            embedding_model: self.embedder.model().to_string(),
            dimension: index.meta().dimension,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };

        tracing::info!(
            chunks = report.chunks,
            files = report.files_loaded,
            elapsed_ms = report.elapsed_ms,
            "ingestion finished"
        );
        Ok((index, report))
    }
}
