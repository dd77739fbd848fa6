//! In-memory flat vector index with exact nearest-neighbor search.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::sqlite;
use crate::core::config::DistanceMetric;
use crate::core::errors::RagError;
use crate::ingest::chunker::Chunk;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexMeta {
    pub format_version: u32,
    pub embedding_model: String,
    pub dimension: usize,
    pub metric: DistanceMetric,
    pub entry_count: usize,
    pub built_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// One search hit; `rank` is 0 for the closest entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub distance: f32,
    pub rank: usize,
}

#[derive(Debug, Clone)]
pub struct VectorIndex {
    meta: IndexMeta,
    entries: Vec<IndexEntry>,
    path: Option<PathBuf>,
}

impl VectorIndex {
    /// Fresh index over `entries`, kept in insertion order.
    pub fn build(
        entries: Vec<IndexEntry>,
        embedding_model: impl Into<String>,
        metric: DistanceMetric,
    ) -> Result<Self, RagError> {
        let dimension = entries.first().map(|e| e.vector.len()).unwrap_or(0);
        if let Some(bad) = entries.iter().find(|e| e.vector.len() != dimension) {
            return Err(RagError::Embedding(format!(
                "vector for chunk {} has dimension {}, expected {}",
                bad.chunk.chunk_id,
                bad.vector.len(),
                dimension
            )));
        }

        Ok(Self {
            meta: IndexMeta {
                format_version: sqlite::FORMAT_VERSION,
                embedding_model: embedding_model.into(),
                dimension,
                metric,
                entry_count: entries.len(),
                built_at: Utc::now(),
            },
            entries,
            path: None,
        })
    }

    pub(crate) fn from_parts(meta: IndexMeta, entries: Vec<IndexEntry>, path: PathBuf) -> Self {
        Self {
            meta,
            entries,
            path: Some(path),
        }
    }

    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn location(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| PathBuf::from("<memory>"))
    }

    /// At most `k` entries by non-decreasing distance; ties keep insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<RetrievedChunk>, RagError> {
        if self.entries.is_empty() {
            return Err(RagError::IndexNotFound(self.location()));
        }
        if query.len() != self.meta.dimension {
            return Err(RagError::corrupt(
                self.location(),
                format!(
                    "query has dimension {}, index was built with {}",
                    query.len(),
                    self.meta.dimension
                ),
            ));
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let d = distance(self.meta.metric, query, &entry.vector);
                (i, if d.is_nan() { f32::INFINITY } else { d })
            })
            .collect();

        // Stable sort keeps insertion order among equal distances.
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .enumerate()
            .map(|(rank, (i, distance))| RetrievedChunk {
                chunk: self.entries[i].chunk.clone(),
                distance,
                rank,
            })
            .collect())
    }

    pub async fn save(&mut self, path: &Path) -> Result<(), RagError> {
        sqlite::save(self, path).await?;
        self.path = Some(path.to_path_buf());
        Ok(())
    }

    pub async fn load(path: &Path) -> Result<Self, RagError> {
        sqlite::load(path).await
    }

    /// Refuses an index built with a different embedding model.
    pub fn ensure_model(&self, embedding_model: &str) -> Result<(), RagError> {
        if self.meta.embedding_model != embedding_model {
            return Err(RagError::corrupt(
                self.location(),
                format!(
                    "built with embedding model `{}`, configured model is `{}`",
                    self.meta.embedding_model, embedding_model
                ),
            ));
        }
        Ok(())
    }
}

pub fn distance(metric: DistanceMetric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        DistanceMetric::Cosine => 1.0 - cosine_similarity(a, b),
        DistanceMetric::L2 => a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>()
            .sqrt(),
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm_a * norm_b;

    if denom <= f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}
