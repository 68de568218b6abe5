use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use wayfarer_core::error::JobError;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`JobError`] for protocol outcomes and adds HTTP-specific
/// variants. Implements [`IntoResponse`] to produce consistent
/// `{ "error": ..., "code": ... }` JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A protocol error from the generation engine.
    #[error(transparent)]
    Job(#[from] JobError),

    /// The requested resource does not exist.
    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    /// The caller may not touch this resource.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for handler return values.
pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Job(job) => (job_status(job), job.code(), job.to_string()),

            ApiError::NotFound { entity } => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("{entity} not found"),
            ),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// HTTP status for each protocol outcome.
///
/// Backend-origin failures surface as gateway errors; the caller's own
/// mistakes stay in the 4xx range.
fn job_status(err: &JobError) -> StatusCode {
    match err {
        JobError::Unauthenticated => StatusCode::UNAUTHORIZED,
        JobError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        JobError::InvalidState => StatusCode::CONFLICT,
        JobError::Cancelled => StatusCode::CONFLICT,
        JobError::BackendRejected(_) => StatusCode::BAD_GATEWAY,
        JobError::GenerationFailed(_) => StatusCode::BAD_GATEWAY,
        JobError::Channel(_) => StatusCode::BAD_GATEWAY,
        JobError::Timeout => StatusCode::GATEWAY_TIMEOUT,
    }
}
