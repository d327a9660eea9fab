//! Job record, status machine, and executor error type.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CODE_CANCELED, CODE_JOB_FAILED};
use crate::events::JobEvent;
use crate::types::{JobId, Timestamp};

/// Job execution status.
///
/// `Completed`, `Failed`, and `Canceled` are terminal: once reached, the
/// record never transitions again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Canceled,
}

impl JobStatus {
    /// Whether this status admits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Canceled
        )
    }

    /// Lowercase wire representation, matching the serialized form.
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Canceled => "canceled",
        }
    }
}

/// Structured error recorded on a failed job and returned by executors.
///
/// Executors signal cooperative cancellation by returning an error whose
/// code is `CANCELED`; the runner records every other code verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub code: String,
    pub message: String,
}

impl JobError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// A generic failure with the `JOB_FAILED` code.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(CODE_JOB_FAILED, message)
    }

    /// The error executors return from a cancellation checkpoint.
    pub fn canceled() -> Self {
        Self::new(CODE_CANCELED, "Job canceled")
    }

    pub fn is_canceled(&self) -> bool {
        self.code == CODE_CANCELED
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for JobError {}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// One unit of asynchronous generation work tracked by the engine.
///
/// Serialized field names are camelCase to match the persisted `job.json`
/// format; `events` is the bounded in-memory ring buffer, while the full
/// history lives in the job's append-only `events.log` on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub job_id: JobId,
    pub project_id: String,
    #[serde(rename = "type")]
    pub job_type: String,
    /// Logical target this job exclusively owns while non-terminal.
    /// Empty means no mutual exclusion.
    #[serde(default)]
    pub lock_key: String,
    pub status: JobStatus,
    /// Free-form human-readable phase label.
    #[serde(default)]
    pub step: String,
    /// Advisory completion percentage, 0..=100.
    #[serde(default)]
    pub progress: u8,
    /// Caller-supplied payload, stored verbatim.
    #[serde(default = "empty_object")]
    pub input: serde_json::Value,
    /// Executor output; `None` until the job completes.
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    /// Set only on failure.
    #[serde(default)]
    pub error: Option<JobError>,
    pub created_at: Timestamp,
    #[serde(default)]
    pub started_at: Option<Timestamp>,
    #[serde(default)]
    pub finished_at: Option<Timestamp>,
    /// Cooperative-cancellation flag; may be set before the executor
    /// observes it, so it is distinct from `status`.
    #[serde(default)]
    pub canceled: bool,
    #[serde(default)]
    pub events: VecDeque<JobEvent>,
}

impl Job {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Wall-clock run duration in seconds, when both timestamps exist and
    /// are ordered.
    pub fn duration_secs(&self) -> Option<f64> {
        let started = self.started_at?;
        let finished = self.finished_at?;
        if finished < started {
            return None;
        }
        Some((finished - started).num_milliseconds() as f64 / 1000.0)
    }
}

/// Input payload for creating a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJob {
    pub project_id: String,
    #[serde(rename = "type")]
    pub job_type: String,
    #[serde(default)]
    pub lock_key: String,
    #[serde(default = "empty_object")]
    pub input: serde_json::Value,
}
