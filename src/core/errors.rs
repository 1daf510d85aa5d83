use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

/// Error taxonomy for the crawl and query subsystems.
///
/// Fetch errors are isolated to a single URL and never abort the crawl;
/// persistence and alignment errors abort their subsystem because they
/// indicate a corrupted invariant rather than a transient condition.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("checkpoint persistence failed: {0}")]
    Persistence(String),
    #[error("corpus alignment broken: {0}")]
    Alignment(String),
    #[error("degenerate embedding: {0}")]
    DegenerateEmbedding(String),
    #[error("model not supported: {0}")]
    UnsupportedModel(String),
    #[error("generation backend failure: {0}")]
    GenerationFailure(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        AppError::Internal(err.to_string())
    }

    pub fn fetch<E: std::fmt::Display>(err: E) -> Self {
        AppError::Fetch(err.to_string())
    }

    pub fn persistence<E: std::fmt::Display>(err: E) -> Self {
        AppError::Persistence(err.to_string())
    }

    pub fn generation<E: std::fmt::Display>(err: E) -> Self {
        AppError::GenerationFailure(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::UnsupportedModel(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::GenerationFailure(_) => StatusCode::BAD_GATEWAY,
            AppError::Fetch(_)
            | AppError::Persistence(_)
            | AppError::Alignment(_)
            | AppError::DegenerateEmbedding(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
