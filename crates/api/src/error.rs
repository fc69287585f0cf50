use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use avatarforge_core::job::StatusError;

/// Application-level error type for HTTP handlers.
///
/// Implements [`IntoResponse`] to produce consistent JSON error
/// responses of the shape `{"error": ..., "code": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A job status query failed.
    #[error(transparent)]
    Status(#[from] StatusError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Status(err) => match err {
                StatusError::UnknownJob(id) => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("Job {id} not found"),
                ),
                StatusError::Unavailable(msg) => {
                    tracing::error!(error = %msg, "Job status layer unavailable");
                    (
                        StatusCode::BAD_GATEWAY,
                        "STATUS_UNAVAILABLE",
                        "Job status is currently unavailable".to_string(),
                    )
                }
            },

            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
