//! API error types with structured JSON responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::pipeline::generation::GenerationError;
use crate::pipeline::PipelineError;
use crate::session::SessionError;

/// Structured error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("A turn is already in progress for this session")]
    TurnInProgress,
    #[error("Medicine placeholder lost: {0}")]
    MaskCorruption(String),
    #[error("Generation failed: {0}")]
    GenerationFailed(String),
    #[error("Translation unavailable: {0}")]
    TranslationUnavailable(String),
    #[error("Retrieval unavailable: {0}")]
    RetrievalUnavailable(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::BadRequest(detail) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail.clone())
            }
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, "NOT_FOUND", detail.clone()),
            ApiError::TurnInProgress => (
                StatusCode::CONFLICT,
                "TURN_IN_PROGRESS",
                "Another message is still being answered in this session".to_string(),
            ),
            ApiError::MaskCorruption(detail) => {
                tracing::error!(detail, "Turn failed on a damaged medicine placeholder");
                (
                    StatusCode::BAD_GATEWAY,
                    "MASK_CORRUPTION",
                    "A medicine name could not be carried through translation".to_string(),
                )
            }
            ApiError::GenerationFailed(detail) => (
                StatusCode::BAD_GATEWAY,
                "GENERATION_FAILED",
                detail.clone(),
            ),
            ApiError::TranslationUnavailable(detail) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "TRANSLATION_UNAVAILABLE",
                detail.clone(),
            ),
            ApiError::RetrievalUnavailable(detail) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "RETRIEVAL_UNAVAILABLE",
                detail.clone(),
            ),
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                )
            }
        }
    }

    /// Client-facing message, as sent in the JSON body or a stream
    /// `error` event.
    pub fn public_message(&self) -> String {
        self.parts().2
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        let body = ErrorBody {
            error: ErrorDetail { code, message },
        };
        (status, Json(body)).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::RetrievalUnavailable(detail) => ApiError::RetrievalUnavailable(detail),
            PipelineError::TranslationUnavailable(detail) => {
                ApiError::TranslationUnavailable(detail)
            }
            PipelineError::MaskCorruption(e) => ApiError::MaskCorruption(e.to_string()),
            PipelineError::GenerationFailed(GenerationError::Degenerated(reason)) => {
                ApiError::GenerationFailed(format!("answer stopped: {reason}"))
            }
            PipelineError::GenerationFailed(e) => ApiError::GenerationFailed(e.to_string()),
            PipelineError::Session(e) => e.into(),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound(id) => ApiError::NotFound(format!("session {id}")),
            SessionError::TurnInProgress => ApiError::TurnInProgress,
            SessionError::Intake(e) => ApiError::BadRequest(e.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}
