use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::core::config::{AppPaths, Settings};
use crate::core::errors::RagError;
use crate::ingest::{IngestPipeline, IngestReport};
use crate::llm::{build_provider, LlmProvider};
use crate::rag::VectorIndex;
use crate::session::{RagPipeline, SessionStore};

/// What the server currently has on disk.
#[derive(Debug, Clone)]
pub enum IndexStatus {
    Missing(PathBuf),
    Corrupt { path: PathBuf, reason: String },
    Ready(Arc<VectorIndex>),
}

impl IndexStatus {
    /// Loads `path`, recording why it is unusable instead of failing.
    pub async fn load(path: &std::path::Path, embedding_model: &str) -> Self {
        let loaded = VectorIndex::load(path)
            .await
            .and_then(|index| index.ensure_model(embedding_model).map(|_| index));
        match loaded {
            Ok(index) => IndexStatus::Ready(Arc::new(index)),
            Err(RagError::IndexNotFound(path)) => IndexStatus::Missing(path),
            Err(RagError::CorruptIndex { path, reason }) => IndexStatus::Corrupt { path, reason },
            Err(other) => IndexStatus::Corrupt {
                path: path.to_path_buf(),
                reason: other.to_string(),
            },
        }
    }

    pub fn ready(&self) -> Result<Arc<VectorIndex>, RagError> {
        match self {
            IndexStatus::Ready(index) => Ok(index.clone()),
            IndexStatus::Missing(path) => Err(RagError::IndexNotFound(path.clone())),
            IndexStatus::Corrupt { path, reason } => Err(RagError::corrupt(path.clone(), reason.clone())),
        }
    }

    pub fn entries(&self) -> usize {
        match self {
            IndexStatus::Ready(index) => index.len(),
            _ => 0,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub settings: Arc<Settings>,
    pub provider: Arc<dyn LlmProvider>,
    pub pipeline: RagPipeline,
    pub ingest: IngestPipeline,
    pub index: Arc<RwLock<IndexStatus>>,
    pub sessions: SessionStore,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub async fn initialize(paths: Arc<AppPaths>, settings: Settings) -> anyhow::Result<Arc<Self>> {
        let provider = build_provider(&settings.models);
        Self::with_provider(paths, settings, provider).await
    }

    pub async fn with_provider(
        paths: Arc<AppPaths>,
        settings: Settings,
        provider: Arc<dyn LlmProvider>,
    ) -> anyhow::Result<Arc<Self>> {
        let pipeline = RagPipeline::from_settings(&settings, provider.clone());
        let ingest = IngestPipeline::from_settings(&settings, provider.clone())?;
        let status = IndexStatus::load(&settings.paths.index_path(), pipeline.embedding_model()).await;

        match &status {
            IndexStatus::Ready(index) => {
                tracing::info!(entries = index.len(), "vector index ready")
            }
            IndexStatus::Missing(path) => {
                tracing::warn!(path = %path.display(), "no vector index yet; POST /ingest or run `automentor ingest`")
            }
            IndexStatus::Corrupt { path, reason } => {
                tracing::error!(path = %path.display(), %reason, "vector index unusable until re-ingested")
            }
        }

        Ok(Arc::new(AppState {
            paths,
            sessions: SessionStore::new(settings.memory.max_turns).with_limits(
                Duration::from_secs(settings.server.session_idle_secs),
                settings.server.max_sessions,
            ),
            settings: Arc::new(settings),
            provider,
            pipeline,
            ingest,
            index: Arc::new(RwLock::new(status)),
            started_at: Utc::now(),
        }))
    }

    /// Rebuilds the index while holding the write lock, so queries wait.
    pub async fn reingest(&self) -> Result<IngestReport, RagError> {
        let mut status = self.index.write().await;
        let (index, report) = self
            .ingest
            .run(&self.settings.paths.source_dir, &self.settings.paths.index_path())
            .await?;
        *status = IndexStatus::Ready(Arc::new(index));
        Ok(report)
    }
}
