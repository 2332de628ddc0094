use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

/// Indexes the multipart field `file`. Other fields are ignored.
pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| ApiError::BadRequest("Field 'file' has no file name".to_string()))?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {}", e)))?;

        tracing::info!("Received upload {} ({} bytes)", file_name, bytes.len());
        let report = state.indexing.ingest(&file_name, &bytes).await?;
        return Ok((StatusCode::CREATED, Json(report)));
    }

    Err(ApiError::BadRequest(
        "Missing multipart field 'file'".to_string(),
    ))
}

pub async fn list_documents(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let count = state.documents.count().await?;
    let sources = state.documents.sources().await?;
    Ok(Json(json!({
        "count": count,
        "sources": sources,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedProvider;
    use crate::state::testing::test_state;
    use axum::body::to_bytes;
    use serde_json::Value;

    #[tokio::test]
    async fn listing_reflects_ingested_sources() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), Arc::new(ScriptedProvider::new()));
        state
            .indexing
            .ingest("guide.txt", b"Step one: unpack the box. Step two: plug it in.")
            .await
            .unwrap();

        let response = list_documents(State(state)).await.unwrap().into_response();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(body["count"], 1);
        assert_eq!(body["sources"][0]["source"], "guide.txt");
        assert_eq!(body["sources"][0]["chunks"], 1);
    }
}
