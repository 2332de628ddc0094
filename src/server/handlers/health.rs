use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

pub async fn health(State(_state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn get_status(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let sessions = state.sessions.list_sessions().await;
    let stored_documents = state.documents.count().await?;
    Ok(Json(json!({
        "status": "ok",
        "provider": state.llm.provider_name(),
        "model": state.llm.settings().model,
        "embedding_model": state.settings.llm.embedding_model,
        "active_sessions": sessions.len(),
        "sessions": sessions,
        "stored_documents": stored_documents,
    })))
}
