use std::path::PathBuf;

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

/// Failures of the ingestion and retrieval pipeline.
#[derive(Debug, Error)]
pub enum RagError {
    #[error("failed to load {}: {reason}", path.display())]
    Load { path: PathBuf, reason: String },
    #[error("embedding service error: {0}")]
    Embedding(String),
    #[error("no vector index found at {}; run `automentor ingest` first", .0.display())]
    IndexNotFound(PathBuf),
    #[error("vector index at {} is corrupt or incompatible ({reason}); re-run `automentor ingest`", path.display())]
    CorruptIndex { path: PathBuf, reason: String },
    #[error("generation service error: {0}")]
    Generation(String),
    #[error("no documents found in {}", .0.display())]
    NoDocuments(PathBuf),
    #[error("session is closed")]
    SessionClosed,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("index storage error: {0}")]
    Storage(String),
}

impl RagError {
    pub fn load<E: std::fmt::Display>(path: impl Into<PathBuf>, err: E) -> Self {
        RagError::Load {
            path: path.into(),
            reason: err.to_string(),
        }
    }

    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        RagError::CorruptIndex {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn storage<E: std::fmt::Display>(err: E) -> Self {
        RagError::Storage(err.to_string())
    }

    /// Whether the user may simply retry the same request.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RagError::Generation(_) | RagError::Embedding(_))
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("unprocessable: {0}")]
    Unprocessable(String),
    #[error("upstream error: {0}")]
    BadGateway(String),
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<RagError> for ApiError {
    fn from(err: RagError) -> Self {
        let message = err.to_string();
        match err {
            RagError::Load { .. } => ApiError::Unprocessable(message),
            RagError::Embedding(_) | RagError::Generation(_) => ApiError::BadGateway(message),
            RagError::IndexNotFound(_) => ApiError::ServiceUnavailable(message),
            RagError::NoDocuments(_) => ApiError::BadRequest(message),
            RagError::SessionClosed => ApiError::Conflict(message),
            RagError::CorruptIndex { .. } | RagError::InvalidConfig(_) | RagError::Storage(_) => {
                ApiError::Internal(message)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        if status.is_server_error() {
            tracing::error!(status = %status, "{}", message);
        }

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}
