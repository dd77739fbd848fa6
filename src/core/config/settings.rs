//! Typed view over `config.yml`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub paths: PathSettings,
    pub models: ModelSettings,
    pub rag: RagSettings,
    pub memory: MemorySettings,
    pub server: ServerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    /// Directory scanned for PDF/CSV/TXT manuals.
    pub source_dir: PathBuf,
    /// Directory holding `index.db`.
    pub index_dir: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("data/source_docs"),
            index_dir: PathBuf::from("data/vector_store"),
        }
    }
}

impl PathSettings {
    pub fn index_path(&self) -> PathBuf {
        self.index_dir.join(INDEX_FILE_NAME)
    }
}

pub const INDEX_FILE_NAME: &str = "index.db";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Ollama,
    OpenaiCompat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub provider: ProviderKind,
    pub base_url: String,
    pub llm_model: String,
    pub embedding_model: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub embedding_batch_size: usize,
    pub request_timeout_secs: u64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Ollama,
            base_url: "http://localhost:11434".to_string(),
            llm_model: "llama3:latest".to_string(),
            embedding_model: "all-minilm".to_string(),
            temperature: None,
            max_tokens: None,
            embedding_batch_size: 32,
            request_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    Cosine,
    L2,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::L2 => "l2",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "cosine" => Some(DistanceMetric::Cosine),
            "l2" => Some(DistanceMetric::L2),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagSettings {
    /// Maximum chunk size in characters
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in characters
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub distance: DistanceMetric,
    /// Prompt budget, estimated at ~4 characters per token
    pub max_prompt_tokens: usize,
    pub condense_question: bool,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 100,
            top_k: 5,
            distance: DistanceMetric::Cosine,
            max_prompt_tokens: 3000,
            condense_question: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySettings {
    /// Most recent turns fed back into prompts; `None` keeps every turn.
    pub max_turns: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
    /// Sessions untouched for this long are dropped.
    pub session_idle_secs: u64,
    pub max_sessions: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_allowed_origins: Vec::new(),
            session_idle_secs: 1800,
            max_sessions: 1000,
        }
    }
}
