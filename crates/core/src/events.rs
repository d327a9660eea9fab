//! Job lifecycle event records and event-name constants.
//!
//! Events are appended to each job's in-memory ring buffer and its on-disk
//! `events.log`, and fanned out live to subscribers.

use serde::{Deserialize, Serialize};

use crate::types::{JobId, Timestamp};

/// Job created and queued.
pub const EVENT_JOB_QUEUED: &str = "job_queued";

/// Executor scheduled, job now running.
pub const EVENT_JOB_STARTED: &str = "job_started";

/// Step label or progress percentage updated during execution.
pub const EVENT_JOB_PROGRESS: &str = "job_progress";

/// Job completed successfully.
pub const EVENT_JOB_COMPLETED: &str = "job_completed";

/// Job failed with an error.
pub const EVENT_JOB_FAILED: &str = "job_failed";

/// Job was canceled (cooperatively, by user or system).
pub const EVENT_JOB_CANCELED: &str = "job_canceled";

/// Cancellation requested; the executor has not necessarily observed it.
pub const EVENT_JOB_CANCEL_REQUESTED: &str = "job_cancel_requested";

/// One entry in a job's event log.
///
/// The wire shape is `{event, jobId, timestamp, ...payload}`: payload
/// fields are flattened alongside the envelope, matching the persisted
/// `events.log` lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEvent {
    pub event: String,
    pub job_id: JobId,
    pub timestamp: Timestamp,
    #[serde(flatten)]
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl JobEvent {
    pub fn new(
        event: impl Into<String>,
        job_id: JobId,
        data: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            event: event.into(),
            job_id,
            timestamp: chrono::Utc::now(),
            data,
        }
    }

    /// Whether this event marks a terminal status transition.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.event.as_str(),
            EVENT_JOB_COMPLETED | EVENT_JOB_FAILED | EVENT_JOB_CANCELED
        )
    }
}
