//! SQLite persistence for the vector index.
//!
//! One file per index with two tables:
//! - `index_meta`: key/value rows (format version, model, dimension, metric,
//!   entry count, build time)
//! - `index_entries`: one row per chunk in insertion order, the vector stored
//!   as little-endian `f32` bytes
//!
//! Saves go to a temporary sibling that is renamed over the target once the
//! write has committed, so readers never observe a half-written index.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use super::index::{IndexEntry, IndexMeta, VectorIndex};
use crate::core::config::DistanceMetric;
use crate::core::errors::RagError;
use crate::ingest::chunker::Chunk;
use crate::ingest::loader::FileType;

pub const FORMAT_VERSION: u32 = 1;

pub async fn save(index: &VectorIndex, path: &Path) -> Result<(), RagError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(RagError::storage)?;
    }

    let tmp_path = temp_sibling(path);
    if tmp_path.exists() {
        tokio::fs::remove_file(&tmp_path)
            .await
            .map_err(RagError::storage)?;
    }

    let options = SqliteConnectOptions::new()
        .filename(&tmp_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Delete);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(RagError::storage)?;

    let written = write_tables(&pool, index).await;
    pool.close().await;

    if let Err(err) = written {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(err);
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(RagError::storage)?;

    tracing::info!(
        path = %path.display(),
        entries = index.len(),
        dimension = index.meta().dimension,
        "vector index saved"
    );
    Ok(())
}

async fn write_tables(pool: &SqlitePool, index: &VectorIndex) -> Result<(), RagError> {
    let mut tx = pool.begin().await.map_err(RagError::storage)?;

    sqlx::query(
        "CREATE TABLE index_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
    )
    .execute(&mut *tx)
    .await
    .map_err(RagError::storage)?;

    sqlx::query(
        "CREATE TABLE index_entries (
            position INTEGER PRIMARY KEY,
            chunk_id TEXT NOT NULL,
            content TEXT NOT NULL,
            source TEXT NOT NULL,
            file_type TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            start_offset INTEGER NOT NULL,
            end_offset INTEGER NOT NULL,
            page INTEGER,
            row_number INTEGER,
            embedding BLOB NOT NULL
        )",
    )
    .execute(&mut *tx)
    .await
    .map_err(RagError::storage)?;

    let meta = index.meta();
    let meta_rows = [
        ("format_version", meta.format_version.to_string()),
        ("embedding_model", meta.embedding_model.clone()),
        ("dimension", meta.dimension.to_string()),
        ("metric", meta.metric.as_str().to_string()),
        ("entry_count", meta.entry_count.to_string()),
        ("built_at", meta.built_at.to_rfc3339()),
    ];
    for (key, value) in meta_rows {
        sqlx::query("INSERT INTO index_meta (key, value) VALUES (?1, ?2)")
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await
            .map_err(RagError::storage)?;
    }

    for (position, entry) in index.entries().iter().enumerate() {
        let chunk = &entry.chunk;
        sqlx::query(
            "INSERT INTO index_entries
                (position, chunk_id, content, source, file_type, chunk_index,
                 start_offset, end_offset, page, row_number, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )
        .bind(position as i64)
        .bind(&chunk.chunk_id)
        .bind(&chunk.text)
        .bind(&chunk.source)
        .bind(chunk.file_type.as_str())
        .bind(chunk.chunk_index as i64)
        .bind(chunk.start_offset as i64)
        .bind(chunk.end_offset as i64)
        .bind(chunk.page.map(i64::from))
        .bind(chunk.row.map(|r| r as i64))
        .bind(serialize_embedding(&entry.vector))
        .execute(&mut *tx)
        .await
        .map_err(RagError::storage)?;
    }

    tx.commit().await.map_err(RagError::storage)?;
    Ok(())
}

pub async fn load(path: &Path) -> Result<VectorIndex, RagError> {
    if !path.is_file() {
        return Err(RagError::IndexNotFound(path.to_path_buf()));
    }

    let corrupt = |reason: String| RagError::corrupt(path, reason);

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(false)
        .read_only(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(|e| corrupt(e.to_string()))?;

    let result = read_tables(&pool, path).await;
    pool.close().await;
    let (meta, entries) = result?;

    tracing::info!(
        path = %path.display(),
        entries = entries.len(),
        model = %meta.embedding_model,
        "vector index loaded"
    );
    Ok(VectorIndex::from_parts(meta, entries, path.to_path_buf()))
}

async fn read_tables(
    pool: &SqlitePool,
    path: &Path,
) -> Result<(IndexMeta, Vec<IndexEntry>), RagError> {
    let corrupt = |reason: String| RagError::corrupt(path, reason);

    let meta_rows = sqlx::query("SELECT key, value FROM index_meta")
        .fetch_all(pool)
        .await
        .map_err(|e| corrupt(format!("unreadable metadata: {}", e)))?;

    let mut values = HashMap::new();
    for row in &meta_rows {
        let key: String = row.try_get("key").map_err(|e| corrupt(e.to_string()))?;
        let value: String = row.try_get("value").map_err(|e| corrupt(e.to_string()))?;
        values.insert(key, value);
    }
    let meta = parse_meta(&values).map_err(corrupt)?;

    if meta.format_version != FORMAT_VERSION {
        return Err(corrupt(format!(
            "format version {} is not supported (expected {})",
            meta.format_version, FORMAT_VERSION
        )));
    }

    let rows = sqlx::query(
        "SELECT chunk_id, content, source, file_type, chunk_index, start_offset,
                end_offset, page, row_number, embedding
         FROM index_entries
         ORDER BY position",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| corrupt(format!("unreadable entries: {}", e)))?;

    if rows.len() != meta.entry_count {
        return Err(corrupt(format!(
            "metadata records {} entries, found {}",
            meta.entry_count,
            rows.len()
        )));
    }

    let mut entries = Vec::with_capacity(rows.len());
    for row in &rows {
        let entry = row_to_entry(row).map_err(corrupt)?;
        if entry.vector.len() != meta.dimension {
            return Err(corrupt(format!(
                "entry {} has dimension {}, metadata records {}",
                entry.chunk.chunk_id,
                entry.vector.len(),
                meta.dimension
            )));
        }
        entries.push(entry);
    }

    Ok((meta, entries))
}

fn parse_meta(values: &HashMap<String, String>) -> Result<IndexMeta, String> {
    let get = |key: &str| {
        values
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| format!("missing metadata key `{}`", key))
    };
    let number = |key: &str| -> Result<usize, String> {
        get(key)?
            .parse::<usize>()
            .map_err(|e| format!("invalid `{}`: {}", key, e))
    };

    let format_version = get("format_version")?
        .parse::<u32>()
        .map_err(|e| format!("invalid `format_version`: {}", e))?;
    let metric_name = get("metric")?;
    let metric = DistanceMetric::parse(metric_name)
        .ok_or_else(|| format!("unknown distance metric `{}`", metric_name))?;
    let built_at = DateTime::parse_from_rfc3339(get("built_at")?)
        .map_err(|e| format!("invalid `built_at`: {}", e))?
        .with_timezone(&Utc);

    Ok(IndexMeta {
        format_version,
        embedding_model: get("embedding_model")?.to_string(),
        dimension: number("dimension")?,
        metric,
        entry_count: number("entry_count")?,
        built_at,
    })
}

fn row_to_entry(row: &SqliteRow) -> Result<IndexEntry, String> {
    let text = |e: sqlx::Error| e.to_string();

    let file_type: String = row.try_get("file_type").map_err(text)?;
    let file_type =
        FileType::parse(&file_type).ok_or_else(|| format!("unknown file type `{}`", file_type))?;
    let page: Option<i64> = row.try_get("page").map_err(text)?;
    let row_number: Option<i64> = row.try_get("row_number").map_err(text)?;
    let embedding: Vec<u8> = row.try_get("embedding").map_err(text)?;

    let chunk = Chunk {
        chunk_id: row.try_get("chunk_id").map_err(text)?,
        text: row.try_get("content").map_err(text)?,
        source: row.try_get("source").map_err(text)?,
        file_type,
        chunk_index: row.try_get::<i64, _>("chunk_index").map_err(text)? as usize,
        start_offset: row.try_get::<i64, _>("start_offset").map_err(text)? as usize,
        end_offset: row.try_get::<i64, _>("end_offset").map_err(text)? as usize,
        page: page.map(|p| p as u32),
        row: row_number.map(|r| r as u64),
    };

    Ok(IndexEntry {
        vector: deserialize_embedding(&embedding)
            .ok_or_else(|| format!("embedding blob for {} has a bad length", chunk.chunk_id))?,
        chunk,
    })
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn deserialize_embedding(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::index::tests::entry;

    fn sample_index() -> VectorIndex {
        let mut with_page = entry("manual", vec![0.5, -1.25, 3.0]);
        with_page.chunk.file_type = FileType::Pdf;
        with_page.chunk.page = Some(7);
        let mut with_row = entry("specs", vec![1.0, 0.0, 0.0]);
        with_row.chunk.file_type = FileType::Csv;
        with_row.chunk.row = Some(12);

        VectorIndex::build(
            vec![entry("notes", vec![0.0, 0.0, 1.0]), with_page, with_row],
            "all-minilm",
            DistanceMetric::Cosine,
        )
        .expect("build")
    }

    #[tokio::test]
    async fn round_trip_preserves_entries_and_order() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("store").join("index.db");
        let mut index = sample_index();

        index.save(&path).await.expect("save");
        let loaded = VectorIndex::load(&path).await.expect("load");

        assert_eq!(loaded.entries(), index.entries());
        assert_eq!(loaded.meta().embedding_model, "all-minilm");
        assert_eq!(loaded.meta().dimension, 3);
        assert_eq!(loaded.meta().entry_count, 3);
        assert_eq!(loaded.meta().metric, DistanceMetric::Cosine);
        assert!(!temp_sibling(&path).exists());
    }

    #[tokio::test]
    async fn save_replaces_previous_index() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("index.db");

        sample_index().save(&path).await.expect("first save");
        let mut smaller =
            VectorIndex::build(vec![entry("only", vec![1.0])], "all-minilm", DistanceMetric::L2)
                .expect("build");
        smaller.save(&path).await.expect("second save");

        let loaded = VectorIndex::load(&path).await.expect("load");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.meta().metric, DistanceMetric::L2);
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let err = VectorIndex::load(&tmp.path().join("index.db"))
            .await
            .expect_err("missing");
        assert!(matches!(err, RagError::IndexNotFound(_)));
    }

    #[tokio::test]
    async fn garbage_file_is_corrupt() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("index.db");
        std::fs::write(&path, b"definitely not sqlite, just some bytes on disk").expect("write");

        let err = VectorIndex::load(&path).await.expect_err("garbage");
        assert!(matches!(err, RagError::CorruptIndex { .. }));
    }

    async fn tamper(path: &Path, sql: &str) {
        let options = SqliteConnectOptions::new().filename(path);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .expect("open");
        sqlx::query(sql).execute(&pool).await.expect("tamper");
        pool.close().await;
    }

    #[tokio::test]
    async fn version_mismatch_is_corrupt() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("index.db");
        sample_index().save(&path).await.expect("save");

        tamper(&path, "UPDATE index_meta SET value = '99' WHERE key = 'format_version'").await;

        let err = VectorIndex::load(&path).await.expect_err("version");
        assert!(err.to_string().contains("format version 99"));
    }

    #[tokio::test]
    async fn entry_count_mismatch_is_corrupt() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("index.db");
        sample_index().save(&path).await.expect("save");

        tamper(&path, "DELETE FROM index_entries WHERE position = 0").await;

        let err = VectorIndex::load(&path).await.expect_err("count");
        assert!(matches!(err, RagError::CorruptIndex { .. }));
    }

    #[test]
    fn embedding_bytes_reject_bad_length() {
        assert_eq!(
            deserialize_embedding(&serialize_embedding(&[1.5, -2.0])),
            Some(vec![1.5, -2.0])
        );
        assert_eq!(deserialize_embedding(&[0, 0, 0]), None);
    }
}
