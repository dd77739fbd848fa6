use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .sessions
        .get(&session_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("session {} not found", session_id)))?;
    let session = session.lock().await;

    Ok(Json(json!({
        "session_id": session.id,
        "state": session.state(),
        "created_at": session.created_at,
        "turns": session.memory().all(),
    })))
}

pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.sessions.remove(&session_id).await {
        return Err(ApiError::NotFound(format!("session {} not found", session_id)));
    }
    tracing::info!(session_id = %session_id, "conversation cleared");
    Ok(Json(json!({ "status": "cleared", "session_id": session_id })))
}
