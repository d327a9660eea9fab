use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use shotforge_core::error::CoreError;
use shotforge_core::job::Job;
use shotforge_core::types::JobId;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for engine errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses
/// of the shape `{ "error": ..., "code": ... }`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from the engine.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A lock conflict enriched with the active job's snapshot, so the
    /// client can attach to the job that is already running instead of
    /// failing outright.
    #[error("Another generation job is already running for this target")]
    LockConflict {
        active_job_id: JobId,
        active_job: Option<Box<Job>>,
    },

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A conflict (409) with a stable, client-facing error code.
    #[error("{message}")]
    Conflict {
        code: &'static str,
        message: String,
    },
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    json!({
                        "error": format!("{entity} with id {id} not found"),
                        "code": "NOT_FOUND",
                    }),
                ),
                CoreError::Validation(message) => (
                    StatusCode::BAD_REQUEST,
                    json!({ "error": message, "code": "VALIDATION_ERROR" }),
                ),
                CoreError::LockConflict { active_job_id, .. } => (
                    StatusCode::CONFLICT,
                    json!({
                        "error": "Another generation job is already running for this target",
                        "code": "LOCK_CONFLICT",
                        "activeJobId": active_job_id,
                    }),
                ),
                CoreError::Internal(message) => {
                    tracing::error!(error = %message, "Internal core error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        json!({
                            "error": "An internal error occurred",
                            "code": "INTERNAL_ERROR",
                        }),
                    )
                }
            },

            // --- HTTP-specific errors ---
            AppError::LockConflict {
                active_job_id,
                active_job,
            } => (
                StatusCode::CONFLICT,
                json!({
                    "error": "Another generation job is already running for this target",
                    "code": "LOCK_CONFLICT",
                    "activeJobId": active_job_id,
                    "activeJob": active_job,
                }),
            ),
            AppError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": message, "code": "BAD_REQUEST" }),
            ),
            AppError::Conflict { code, message } => {
                (StatusCode::CONFLICT, json!({ "error": message, "code": code }))
            }
        };

        (status, axum::Json(body)).into_response()
    }
}
