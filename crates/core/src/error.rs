use crate::types::JobId;

/// Error code recorded on jobs stopped by cooperative cancellation.
pub const CODE_CANCELED: &str = "CANCELED";

/// Fallback error code for executor failures without a specific code.
pub const CODE_JOB_FAILED: &str = "JOB_FAILED";

/// Error code recorded on jobs found non-terminal during startup recovery.
pub const CODE_SERVER_RESTARTED: &str = "SERVER_RESTARTED";

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: JobId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Another generation job is already running for this target")]
    LockConflict {
        lock_key: String,
        active_job_id: JobId,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}
