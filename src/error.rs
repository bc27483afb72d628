use axum::extract::multipart::MultipartError;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::services::storage::StorageError;

pub type RedactResult<T> = Result<T, RedactError>;

/// Errors surfaced by the redaction pipeline and the job surface.
#[derive(Debug, thiserror::Error)]
pub enum RedactError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Invalid region: {0}")]
    InvalidRegion(String),

    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("Unsupported media: {0}")]
    UnsupportedMedia(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Image pipeline failed: {0}")]
    Pipeline(String),

    #[error("Job not found: {0}")]
    JobNotFound(uuid::Uuid),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RedactError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn limit(msg: impl Into<String>) -> Self {
        Self::LimitExceeded(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedMedia(msg.into())
    }

    pub fn pipeline(msg: impl Into<String>) -> Self {
        Self::Pipeline(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            RedactError::Validation(_) | RedactError::InvalidRegion(_) => "VALIDATION_ERROR",
            RedactError::LimitExceeded(_) => "LIMIT_EXCEEDED",
            RedactError::UnsupportedMedia(_) => "UNSUPPORTED_MEDIA",
            RedactError::Storage(e) => e.code(),
            RedactError::Pipeline(_) => "PIPELINE_ERROR",
            RedactError::JobNotFound(_) => "JOB_NOT_FOUND",
            RedactError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            RedactError::Validation(_) | RedactError::InvalidRegion(_) => StatusCode::BAD_REQUEST,
            RedactError::LimitExceeded(_) => StatusCode::PAYLOAD_TOO_LARGE,
            RedactError::UnsupportedMedia(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            RedactError::Storage(e) => e.status(),
            RedactError::JobNotFound(_) => StatusCode::NOT_FOUND,
            RedactError::Pipeline(_) | RedactError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<JsonRejection> for RedactError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::LimitExceeded(rejection.body_text())
        } else {
            Self::Validation(rejection.body_text())
        }
    }
}

impl From<MultipartRejection> for RedactError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<MultipartError> for RedactError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::LimitExceeded(err.body_text())
        } else {
            Self::Validation(format!("malformed multipart body: {}", err.body_text()))
        }
    }
}

impl From<garde::Report> for RedactError {
    fn from(report: garde::Report) -> Self {
        Self::Validation(report.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: ErrorDetail<'a>,
}

#[derive(Serialize)]
struct ErrorDetail<'a> {
    code: &'a str,
    message: String,
}

impl IntoResponse for RedactError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "Request failed");
        } else {
            tracing::debug!(code = self.code(), error = %self, "Request rejected");
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code(),
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}
