//! API error types.
//!
//! Every failure leaves the server as
//! `{"error": {"kind": ..., "message": ..., ...}}` with a status derived
//! from the kind.

use axum::extract::rejection::JsonRejection;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use clipper_models::{ErrorKind, JobFailure, JobId, ValidationError};

pub type ApiResult<T> = Result<T, ApiError>;

/// Seconds a rejected caller is asked to wait before retrying.
const RETRY_AFTER_SECS: &str = "5";

/// Message shown in place of internal details in production.
const INTERNAL_MESSAGE: &str = "An internal error occurred";

/// Non-standard "client closed request".
const CLIENT_CLOSED_REQUEST: u16 = 499;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("Malformed request body: {0}")]
    MalformedBody(String),

    #[error("Request body too large: {0}")]
    PayloadTooLarge(String),

    #[error("{failure}")]
    Job {
        failure: JobFailure,
        job_id: Option<JobId>,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limit exceeded; try again later")]
    RateLimited,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// A job failure, tagged with the job it belongs to.
    pub fn job(failure: JobFailure, job_id: &JobId) -> Self {
        Self::Job {
            failure,
            job_id: Some(job_id.clone()),
        }
    }

    /// Stable kind string carried in the body.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Validation(_) | ApiError::MalformedBody(_) => ErrorKind::InvalidRequest.as_str(),
            ApiError::Job { failure, .. } => failure.kind.as_str(),
            ApiError::PayloadTooLarge(_) => "payload_too_large",
            ApiError::NotFound(_) => "not_found",
            ApiError::RateLimited => "rate_limited",
            ApiError::Internal(_) => ErrorKind::Internal.as_str(),
        }
    }

    /// Strip diagnostics that must not reach callers in production:
    /// transcoder stderr and internal error details.
    pub fn redacted(self, production: bool) -> Self {
        if !production {
            return self;
        }
        match self {
            ApiError::Job { mut failure, job_id } => {
                failure.stderr_excerpt = None;
                if failure.kind == ErrorKind::Internal {
                    tracing::error!("Internal job failure: {}", failure.message);
                    failure.message = INTERNAL_MESSAGE.to_string();
                }
                ApiError::Job { failure, job_id }
            }
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                ApiError::Internal(INTERNAL_MESSAGE.to_string())
            }
            other => other,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::MalformedBody(_) => StatusCode::BAD_REQUEST,
            ApiError::Job { failure, .. } => status_for_kind(failure.kind),
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// HTTP status for a job failure kind.
pub fn status_for_kind(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorKind::ResourceExhausted => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::SourceUnavailable => StatusCode::BAD_GATEWAY,
        ErrorKind::TranscodeFailure | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::TimedOut => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Canceled => StatusCode::from_u16(CLIENT_CLOSED_REQUEST).unwrap_or(StatusCode::BAD_REQUEST),
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::PayloadTooLarge(rejection.body_text())
        } else {
            Self::MalformedBody(rejection.body_text())
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    kind: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    job_id: Option<JobId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stderr_excerpt: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let kind = self.kind();

        let body = match self {
            ApiError::Validation(e) => ErrorBody {
                kind,
                message: e.to_string(),
                reason: Some(e.reason()),
                job_id: None,
                exit_code: None,
                stderr_excerpt: None,
            },
            ApiError::Job { failure, job_id } => ErrorBody {
                kind,
                message: failure.message,
                reason: None,
                job_id,
                exit_code: failure.exit_code,
                stderr_excerpt: failure.stderr_excerpt,
            },
            other => ErrorBody {
                kind,
                message: other.to_string(),
                reason: None,
                job_id: None,
                exit_code: None,
                stderr_excerpt: None,
            },
        };

        let mut response = (status, Json(ErrorResponse { error: body })).into_response();
        match status {
            StatusCode::SERVICE_UNAVAILABLE => {
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECS));
            }
            StatusCode::TOO_MANY_REQUESTS => {
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
            }
            _ => {}
        }
        response
    }
}
