// Error types for the inference core and their conversion into HTTP responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Errors raised by the registry, weight store, and dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum InferError {
    /// Malformed model catalog or a registry/dispatcher mismatch.
    /// Fatal at startup; at request time it indicates a deployment defect.
    #[error("configuration error: {0}")]
    Config(String),

    /// The client asked for a model name the registry does not know.
    #[error("unknown model '{0}'")]
    UnknownModel(String),

    /// Downloading a weight artifact failed. The cache is left untouched.
    #[error("failed to fetch weight artifact '{url}': {message}")]
    Fetch { url: String, message: String },

    /// The uploaded bytes could not be decoded as an image.
    #[error("failed to decode input image: {0}")]
    Decode(String),

    /// Encoding the result into the output container failed.
    #[error("failed to encode output image: {0}")]
    Encode(String),

    /// The execution backend raised an unexpected condition.
    #[error("inference failed: {0}")]
    Inference(String),

    /// The worker pool's admission queue is full.
    #[error("server is busy, try again later")]
    Busy,
}

/// API-facing error shaped as an HTTP response with a JSON body.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    UnprocessableContent(String),
    TooManyRequests(String),
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message, error_code_str) = match self {
            Self::BadRequest(s) => (StatusCode::BAD_REQUEST, s, "BAD_REQUEST"),
            Self::NotFound(s) => (StatusCode::NOT_FOUND, s, "NOT_FOUND"),
            Self::UnprocessableContent(s) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                s,
                "UNPROCESSABLE_CONTENT",
            ),
            Self::TooManyRequests(s) => (StatusCode::TOO_MANY_REQUESTS, s, "TOO_MANY_REQUESTS"),
            Self::InternalServerError(s) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                s,
                "INTERNAL_SERVER_ERROR",
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code_str,
                "message": error_message,
            }
        }));
        (status, body).into_response()
    }
}

// Map the core taxonomy onto HTTP statuses at the web edge. Client mistakes
// (unknown model, unreadable upload) become 4xx; everything else is a
// server-side failure.
impl From<InferError> for ApiError {
    fn from(err: InferError) -> Self {
        match &err {
            InferError::UnknownModel(_) => Self::NotFound(err.to_string()),
            InferError::Decode(_) => Self::UnprocessableContent(err.to_string()),
            InferError::Busy => Self::TooManyRequests(err.to_string()),
            InferError::Config(_)
            | InferError::Fetch { .. }
            | InferError::Encode(_)
            | InferError::Inference(_) => Self::InternalServerError(err.to_string()),
        }
    }
}

impl From<axum::extract::multipart::MultipartError> for ApiError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        Self::BadRequest(format!("Invalid multipart request: {}", err))
    }
}
