//! HTTP error mapping.
//!
//! Only the admin surface and malformed uploads fail loudly; the
//! transcription pipeline converts engine failures into zero-valued 200
//! responses before they ever reach this type (edge producers must not
//! retry on 5xx).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use orac_stt_core::StoreError;
use orac_stt_runtime::SupervisorError;

/// Axum-facing error type.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
    status: u16,
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            HttpError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            HttpError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            HttpError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            HttpError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            HttpError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = ErrorBody {
            error: message,
            status: status.as_u16(),
        };
        (status, axum::Json(body)).into_response()
    }
}

impl From<StoreError> for HttpError {
    fn from(err: StoreError) -> Self {
        HttpError::Internal(err.to_string())
    }
}

impl From<SupervisorError> for HttpError {
    fn from(err: SupervisorError) -> Self {
        match err {
            SupervisorError::UnknownModel(_) => HttpError::BadRequest(err.to_string()),
            SupervisorError::SupervisionDisabled => HttpError::Conflict(err.to_string()),
            SupervisorError::BinaryMissing(_)
            | SupervisorError::ModelMissing(_)
            | SupervisorError::Spawn(_)
            | SupervisorError::StartupTimeout(_) => HttpError::Unavailable(err.to_string()),
        }
    }
}
