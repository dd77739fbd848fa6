use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::Json;
use serde_json::{json, Value};

use super::utils::sanitize_upload_name;
use crate::core::errors::ApiError;
use crate::state::AppState;

/// Stores uploaded `files` in the source directory, then rebuilds the index.
pub async fn ingest(
    State(state): State<Arc<AppState>>,
    multipart: Option<Multipart>,
) -> Result<Json<Value>, ApiError> {
    let source_dir = state.settings.paths.source_dir.clone();
    let mut uploaded = Vec::new();
    let mut rejected = Vec::new();

    if let Some(mut multipart) = multipart {
        tokio::fs::create_dir_all(&source_dir)
            .await
            .map_err(ApiError::internal)?;

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::BadRequest(e.to_string()))?
        {
            if field.name() != Some("files") {
                continue;
            }
            let raw_name = field.file_name().unwrap_or_default().to_string();
            let Some(name) = sanitize_upload_name(&raw_name) else {
                tracing::warn!(file = %raw_name, "rejected upload");
                rejected.push(raw_name);
                continue;
            };

            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(e.to_string()))?;
            tokio::fs::write(source_dir.join(&name), &bytes)
                .await
                .map_err(ApiError::internal)?;
            tracing::info!(file = %name, bytes = bytes.len(), "stored upload");
            uploaded.push(name);
        }
    }

    let report = state.reingest().await?;

    Ok(Json(json!({
        "uploaded": uploaded,
        "rejected": rejected,
        "report": report,
    })))
}
