use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::UnsupportedMediaType(msg) => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, msg.clone())
            }
            ApiError::Llm(err) => (err.status_code(), err.to_string()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}

/// Failures of the hosted model API and of interpreting its replies.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("model credential missing or rejected: {0}")]
    Auth(String),
    #[error("model transport error: {0}")]
    Transport(String),
    #[error("model provider is rate limiting requests: {0}")]
    RateLimit(String),
    #[error("model provider returned {status}: {message}")]
    Provider { status: u16, message: String },
    #[error("unrecognized intent classification: {0:?}")]
    Classification(String),
}

impl LlmError {
    pub fn transport<E: std::fmt::Display>(err: E) -> Self {
        LlmError::Transport(err.to_string())
    }

    /// Maps an unsuccessful HTTP status from the provider onto the taxonomy.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => LlmError::Auth(message),
            429 => LlmError::RateLimit(message),
            _ => LlmError::Provider { status, message },
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            LlmError::Auth(_) => StatusCode::SERVICE_UNAVAILABLE,
            LlmError::RateLimit(_) => StatusCode::TOO_MANY_REQUESTS,
            LlmError::Transport(_) | LlmError::Provider { .. } | LlmError::Classification(_) => {
                StatusCode::BAD_GATEWAY
            }
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        LlmError::Transport(err.to_string())
    }
}

/// Failures while turning an uploaded file into stored documents.
#[derive(Debug, Error)]
pub enum RagError {
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),
    #[error("failed to extract text from {source_name}: {reason}")]
    Extraction { source_name: String, reason: String },
    #[error("document io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Llm(#[from] LlmError),
}

impl From<RagError> for ApiError {
    fn from(err: RagError) -> Self {
        match err {
            RagError::UnsupportedFormat(ext) => {
                ApiError::UnsupportedMediaType(format!("Unsupported document format: {}", ext))
            }
            RagError::Extraction { .. } => ApiError::BadRequest(err.to_string()),
            RagError::Io(io) => ApiError::internal(io),
            RagError::Llm(llm) => ApiError::Llm(llm),
        }
    }
}
