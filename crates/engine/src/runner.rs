//! Job runner: drives a queued job through a caller-supplied executor.
//!
//! The engine never learns what a job does. [`JobEngine::run_job`] takes
//! an executor closure, transitions the job to `running`, and spawns the
//! executor's future on the runtime so the caller never blocks on the
//! actual work. The executor's outcome is translated into exactly one
//! terminal transition; cancellation is cooperative and always wins over
//! a late success.

use futures::future::BoxFuture;
use shotforge_core::error::{CoreError, CODE_JOB_FAILED};
use shotforge_core::events::{
    EVENT_JOB_CANCELED, EVENT_JOB_CANCEL_REQUESTED, EVENT_JOB_COMPLETED, EVENT_JOB_FAILED,
    EVENT_JOB_PROGRESS, EVENT_JOB_STARTED,
};
use shotforge_core::job::{Job, JobError, JobStatus};
use shotforge_core::types::JobId;
use tokio_util::sync::CancellationToken;

use crate::events::progress_fields;
use crate::store::JobEngine;

/// Future returned by a job executor.
pub type JobFuture = BoxFuture<'static, Result<serde_json::Value, JobError>>;

/// Control handle passed to executors.
///
/// Cancellation is cooperative: the runner never interrupts a running
/// executor, it only exposes the request via [`is_canceled`] and
/// [`check_canceled`] for the executor to poll at its own checkpoints.
///
/// [`is_canceled`]: JobContext::is_canceled
/// [`check_canceled`]: JobContext::check_canceled
#[derive(Clone)]
pub struct JobContext {
    engine: JobEngine,
    job: Job,
    cancel: CancellationToken,
}

impl JobContext {
    /// Snapshot of the job as of the `running` transition.
    pub fn job(&self) -> &Job {
        &self.job
    }

    /// Append a custom event to the job's log and fan it out live.
    pub fn emit(&self, event: &str, payload: serde_json::Map<String, serde_json::Value>) {
        let mut state = self.engine.lock_state();
        self.engine
            .append_event(&mut state, self.job.job_id, event, payload);
    }

    /// Update the step label and, optionally, the progress percentage
    /// (clamped to `0..=100`), emitting a `job_progress` event.
    pub fn set_step(&self, step: &str, progress: Option<u8>) {
        self.set_step_with(step, progress, serde_json::Map::new());
    }

    /// Like [`set_step`](Self::set_step), with extra payload fields
    /// merged into the `job_progress` event.
    pub fn set_step_with(
        &self,
        step: &str,
        progress: Option<u8>,
        extra: serde_json::Map<String, serde_json::Value>,
    ) {
        let mut state = self.engine.lock_state();
        let Some(job) = state.jobs.get_mut(&self.job.job_id) else {
            return;
        };
        if !step.is_empty() {
            job.step = step.to_string();
        }
        if let Some(progress) = progress {
            job.progress = progress.min(100);
        }
        let mut payload = progress_fields(&job.step, job.progress);
        payload.extend(extra);
        self.engine
            .append_event(&mut state, self.job.job_id, EVENT_JOB_PROGRESS, payload);
    }

    /// Whether cancellation has been requested for this job.
    pub fn is_canceled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Checkpoint helper: fail fast with a `CANCELED`-tagged error when
    /// cancellation has been requested.
    pub fn check_canceled(&self) -> Result<(), JobError> {
        if self.is_canceled() {
            Err(JobError::canceled())
        } else {
            Ok(())
        }
    }
}

/// How an executor outcome resolves, after the cancellation flag has had
/// its say.
enum Resolution {
    Completed(serde_json::Value),
    Canceled,
    Failed(JobError),
}

impl JobEngine {
    /// Transition a queued job to `running` and drive `executor` on a
    /// freshly spawned task.
    ///
    /// Returns as soon as the transition is recorded, without waiting on
    /// the executor; calling it again for a job that is no longer
    /// `queued` is a no-op. Must be called from within a Tokio runtime.
    pub fn run_job<F>(&self, job_id: JobId, executor: F) -> Result<(), CoreError>
    where
        F: FnOnce(JobContext) -> JobFuture + Send + 'static,
    {
        let ctx = {
            let mut state = self.lock_state();
            {
                let Some(job) = state.jobs.get_mut(&job_id) else {
                    return Err(CoreError::NotFound {
                        entity: "Job",
                        id: job_id,
                    });
                };
                if job.status != JobStatus::Queued {
                    return Ok(());
                }
                job.status = JobStatus::Running;
                job.step = "running".into();
                job.progress = 2;
                job.started_at = Some(chrono::Utc::now());
            }
            self.append_event(
                &mut state,
                job_id,
                EVENT_JOB_STARTED,
                progress_fields("running", 2),
            );

            let cancel = state.cancellations.entry(job_id).or_default().clone();
            JobContext {
                engine: self.clone(),
                job: state.jobs[&job_id].clone(),
                cancel,
            }
        };

        let engine = self.clone();
        tokio::spawn(async move {
            let outcome = executor(ctx).await;
            engine.finish_job(job_id, outcome);
        });
        Ok(())
    }

    /// Request cooperative cancellation.
    ///
    /// Returns whether the request was accepted: `false` for unknown or
    /// already-terminal jobs, `true` when the flag was freshly set or was
    /// already pending. The executor must poll the flag to actually stop;
    /// the runner cannot forcibly interrupt it.
    pub fn cancel_job(&self, job_id: JobId) -> bool {
        let mut state = self.lock_state();
        let payload = {
            let Some(job) = state.jobs.get_mut(&job_id) else {
                return false;
            };
            if job.status.is_terminal() {
                return false;
            }
            if job.canceled {
                return true;
            }
            job.canceled = true;
            progress_fields(&job.step, job.progress)
        };
        if let Some(token) = state.cancellations.get(&job_id) {
            token.cancel();
        }
        self.append_event(&mut state, job_id, EVENT_JOB_CANCEL_REQUESTED, payload);
        tracing::info!(job_id = %job_id, "Job cancellation requested");
        true
    }

    /// Apply the executor outcome: exactly one terminal transition, lock
    /// release, guarded final persistence, and deferred listener cleanup.
    pub(crate) fn finish_job(&self, job_id: JobId, outcome: Result<serde_json::Value, JobError>) {
        let mut state = self.lock_state();
        let was_canceled = match state.jobs.get(&job_id) {
            Some(job) if !job.status.is_terminal() => job.canceled,
            _ => return,
        };

        let resolution = match outcome {
            Ok(_) if was_canceled => Resolution::Canceled,
            Ok(result) => Resolution::Completed(result),
            Err(err) if was_canceled || err.is_canceled() => Resolution::Canceled,
            Err(err) => Resolution::Failed(err),
        };

        let (event, payload) = {
            let Some(job) = state.jobs.get_mut(&job_id) else {
                return;
            };
            let finished_at = chrono::Utc::now();
            job.finished_at = Some(finished_at);
            let finished_value = serde_json::to_value(finished_at).unwrap_or_default();

            match resolution {
                Resolution::Completed(result) => {
                    job.status = JobStatus::Completed;
                    job.step = "completed".into();
                    job.progress = 100;
                    job.result = Some(result);
                    let mut payload = progress_fields("completed", 100);
                    payload.insert("finishedAt".into(), finished_value);
                    (EVENT_JOB_COMPLETED, payload)
                }
                Resolution::Canceled => {
                    job.status = JobStatus::Canceled;
                    job.step = "canceled".into();
                    let mut payload = progress_fields("canceled", job.progress);
                    payload.insert("finishedAt".into(), finished_value);
                    (EVENT_JOB_CANCELED, payload)
                }
                Resolution::Failed(err) => {
                    job.status = JobStatus::Failed;
                    job.step = "failed".into();
                    let code = if err.code.trim().is_empty() {
                        CODE_JOB_FAILED.to_string()
                    } else {
                        err.code
                    };
                    let message = if err.message.trim().is_empty() {
                        "Generation job failed".to_string()
                    } else {
                        err.message
                    };
                    let recorded = JobError::new(code, message);
                    job.error = Some(recorded.clone());
                    let mut payload = progress_fields("failed", job.progress);
                    payload.insert(
                        "error".into(),
                        serde_json::to_value(&recorded).unwrap_or_default(),
                    );
                    payload.insert("finishedAt".into(), finished_value);
                    (EVENT_JOB_FAILED, payload)
                }
            }
        };

        self.append_event(&mut state, job_id, event, payload);

        let Some(job) = state.jobs.get(&job_id).cloned() else {
            return;
        };
        state.locks.release(&job);
        state.cancellations.remove(&job_id);
        tracing::info!(
            job_id = %job_id,
            status = job.status.as_str(),
            "Generation job finished",
        );
        if state.subscribers.contains_key(&job_id) {
            self.schedule_listener_cleanup(job_id);
        }
    }
}
