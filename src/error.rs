use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("context length at position {index} must be greater than 0, got {value}")]
    InvalidContextLength { index: usize, value: i64 },
    #[error("{choices} choices were returned but {context_lengths} context lengths were supplied")]
    ContextLengthMismatch {
        choices: usize,
        context_lengths: usize,
    },
    #[error("missing required option: {0}")]
    MissingOption(String),
    #[error("invalid option '{key}': {reason}")]
    InvalidOption { key: String, reason: String },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("unsupported operation: {0}")]
    Unsupported(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("invalid request: {0}")]
    BadRequest(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for AdapterError {
    fn into_response(self) -> Response {
        let status = match self {
            AdapterError::InvalidContextLength { .. }
            | AdapterError::ContextLengthMismatch { .. }
            | AdapterError::MissingOption(_)
            | AdapterError::InvalidOption { .. }
            | AdapterError::MalformedResponse(_)
            | AdapterError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AdapterError::Unsupported(_) => StatusCode::NOT_IMPLEMENTED,
            AdapterError::Transport(_) => StatusCode::BAD_GATEWAY,
            AdapterError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AdapterError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({
            "error": self.to_string(),
        });

        (status, axum::Json(body)).into_response()
    }
}
