use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;
use crate::session::SourceRef;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub answer: String,
    pub session_id: String,
    pub sources: Vec<SourceRef>,
    pub turn: u64,
}

pub async fn query(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let question = payload.question.trim();
    if question.is_empty() {
        return Err(ApiError::BadRequest("question must not be empty".to_string()));
    }

    // Held for the whole turn so a rebuild cannot swap the index underneath.
    let status = state.index.read().await;
    let index = status.ready()?;

    let session = state
        .sessions
        .get_or_create(payload.session_id.as_deref())
        .await;
    let mut session = session.lock().await;

    let answer = state.pipeline.ask(&index, &mut session, question).await?;

    Ok(Json(QueryResponse {
        answer: answer.answer,
        session_id: session.id.clone(),
        sources: answer.sources,
        turn: answer.turn,
    }))
}
