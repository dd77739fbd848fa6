use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::state::{AppState, IndexStatus};

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = state.index.read().await;
    let index_state = match &*status {
        IndexStatus::Ready(_) => "ready",
        IndexStatus::Missing(_) => "missing",
        IndexStatus::Corrupt { .. } => "corrupt",
    };

    Json(json!({
        "status": "ok",
        "initialized": matches!(&*status, IndexStatus::Ready(_)),
        "index": index_state,
        "entries": status.entries(),
        "provider": state.provider.name(),
        "llm_model": state.settings.models.llm_model,
        "embedding_model": state.settings.models.embedding_model,
        "uptime_secs": (chrono::Utc::now() - state.started_at).num_seconds(),
    }))
}
