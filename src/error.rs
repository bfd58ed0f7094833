use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// A single rejected request field, reported inside the 400 body.
#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid request")]
    Validation(Vec<FieldError>),
    #[error("daily request limit of {limit} reached")]
    QuotaExceeded { limit: u32 },
    #[error("Chat history is too long. Please start a new conversation.")]
    HistoryTooLong,
    #[error("story session not found: {0}")]
    SessionNotFound(String),
    #[error("text generation failed: {0}")]
    Provider(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        ServiceError::Provider(err.to_string())
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ServiceError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({ "errors": errors }),
            ),
            ServiceError::QuotaExceeded { limit } => (
                StatusCode::TOO_MANY_REQUESTS,
                serde_json::json!({
                    "error": "Rate limit exceeded",
                    "message": format!(
                        "The API has reached its daily limit of {limit} requests. Please try again tomorrow."
                    ),
                    "remaining": 0,
                }),
            ),
            // History overflow answers with a `content` body, not the
            // usual error shape.
            ServiceError::HistoryTooLong => (
                StatusCode::TOO_MANY_REQUESTS,
                serde_json::json!({ "content": self.to_string() }),
            ),
            ServiceError::SessionNotFound(_) => (
                StatusCode::NOT_FOUND,
                serde_json::json!({ "error": self.to_string() }),
            ),
            ServiceError::Provider(_) | ServiceError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({ "error": self.to_string() }),
            ),
        };

        (status, axum::Json(body)).into_response()
    }
}
