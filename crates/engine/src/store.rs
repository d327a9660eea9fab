//! Job store: canonical job table, disk mirror, and startup recovery.
//!
//! Persisted layout, per project and per job:
//!
//! ```text
//! <project>/rendered/storyboard/generation_jobs/<jobId>/job.json
//! <project>/rendered/storyboard/generation_jobs/<jobId>/events.log
//! ```
//!
//! `job.json` is overwritten with the full record on every mutation;
//! `events.log` is append-only and never rewritten. Writes happen
//! synchronously inside the engine's critical section, so a reader
//! checking the files right after a mutating call always sees the latest
//! state.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use shotforge_core::error::{CoreError, CODE_SERVER_RESTARTED};
use shotforge_core::events::{JobEvent, EVENT_JOB_FAILED, EVENT_JOB_QUEUED};
use shotforge_core::job::{Job, JobError, JobStatus, SubmitJob};
use shotforge_core::types::JobId;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::events::progress_fields;
use crate::locks::LockIndex;
use crate::projects::ProjectManager;

/// Job state directory inside each project.
pub const JOBS_SUBDIR: &str = "rendered/storyboard/generation_jobs";

/// Default page size for [`JobEngine::list_jobs`].
pub const DEFAULT_LIST_LIMIT: usize = 50;

/// Default window size for [`JobEngine::get_metrics`].
pub const DEFAULT_METRICS_LIMIT: usize = 200;

const RECORD_FILE: &str = "job.json";
const EVENTS_FILE: &str = "events.log";

/// Handle to the generation job engine.
///
/// Cheap to clone; all clones share the same state. Constructing the
/// engine via [`JobEngine::open`] runs startup recovery, so the table
/// never starts with a running job that has no live executor.
#[derive(Clone)]
pub struct JobEngine {
    pub(crate) inner: Arc<EngineInner>,
}

pub(crate) struct EngineInner {
    pub(crate) projects: Arc<dyn ProjectManager>,
    pub(crate) config: EngineConfig,
    pub(crate) state: Mutex<EngineState>,
}

/// Everything the engine mutates, guarded as one critical section so the
/// lock-conflict check and lock registration cannot interleave.
pub(crate) struct EngineState {
    pub(crate) jobs: HashMap<JobId, Job>,
    pub(crate) locks: LockIndex,
    pub(crate) subscribers: HashMap<JobId, broadcast::Sender<JobEvent>>,
    pub(crate) cancellations: HashMap<JobId, CancellationToken>,
}

impl JobEngine {
    /// Open the engine over a project tree: load every persisted job
    /// record and reconcile jobs left non-terminal by a previous process
    /// as failed, releasing any locks they held.
    pub fn open(projects: Arc<dyn ProjectManager>, config: EngineConfig) -> Self {
        let engine = Self {
            inner: Arc::new(EngineInner {
                projects,
                config,
                state: Mutex::new(EngineState {
                    jobs: HashMap::new(),
                    locks: LockIndex::default(),
                    subscribers: HashMap::new(),
                    cancellations: HashMap::new(),
                }),
            }),
        };
        engine.load_existing_jobs();
        engine
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a job in `queued` status and persist it.
    ///
    /// Fails with [`CoreError::LockConflict`] (carrying the conflicting
    /// job's id) when another non-terminal job already holds `lockKey`.
    /// A stale mapping to a terminal job is cleared and the create
    /// proceeds.
    pub fn create_job(&self, submit: SubmitJob) -> Result<Job, CoreError> {
        let project_id = submit.project_id.trim().to_string();
        if project_id.is_empty() {
            return Err(CoreError::Validation("projectId is required".into()));
        }
        let job_type = submit.job_type.trim().to_string();
        if job_type.is_empty() {
            return Err(CoreError::Validation("type is required".into()));
        }
        let lock_key = submit.lock_key.trim().to_string();
        let input = if submit.input.is_null() {
            serde_json::Value::Object(serde_json::Map::new())
        } else {
            submit.input
        };

        let mut state = self.lock_state();
        if !lock_key.is_empty() {
            if let Some(active_job_id) = state.locks.holder(&lock_key) {
                let active = state.jobs.get(&active_job_id);
                if active.is_some_and(|job| !job.status.is_terminal()) {
                    return Err(CoreError::LockConflict {
                        lock_key,
                        active_job_id,
                    });
                }
                state.locks.clear(&lock_key);
            }
        }

        let job_id = uuid::Uuid::new_v4();
        let job = Job {
            job_id,
            project_id,
            job_type,
            lock_key,
            status: JobStatus::Queued,
            step: "queued".into(),
            progress: 0,
            input,
            result: None,
            error: None,
            created_at: chrono::Utc::now(),
            started_at: None,
            finished_at: None,
            canceled: false,
            events: VecDeque::new(),
        };
        state.locks.track(&job);
        state.cancellations.insert(job_id, CancellationToken::new());
        state.jobs.insert(job_id, job);
        self.append_event(
            &mut state,
            job_id,
            EVENT_JOB_QUEUED,
            progress_fields("queued", 0),
        );

        tracing::info!(job_id = %job_id, "Generation job created");
        Ok(state.jobs[&job_id].clone())
    }

    /// Fetch a point-in-time snapshot of a job.
    ///
    /// The returned record is a full copy decoupled from the live table;
    /// callers cannot corrupt engine state through it.
    pub fn get_job(&self, job_id: JobId) -> Option<Job> {
        self.lock_state().jobs.get(&job_id).cloned()
    }

    /// List job snapshots sorted by creation time, newest first,
    /// optionally filtered by project. `limit` is clamped to `[1, 200]`.
    pub fn list_jobs(&self, project_id: Option<&str>, limit: usize) -> Vec<Job> {
        let limit = limit.clamp(1, 200);
        let state = self.lock_state();
        let mut jobs: Vec<&Job> = state
            .jobs
            .values()
            .filter(|job| project_id.map_or(true, |p| job.project_id == p))
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs.into_iter().take(limit).cloned().collect()
    }

    /// Resolve the non-terminal job currently holding `lock_key`.
    ///
    /// A mapping pointing at a job that has since become terminal is
    /// cleared and `None` is returned rather than surfacing stale data.
    pub fn find_active_job_by_lock(&self, lock_key: &str) -> Option<Job> {
        let key = lock_key.trim();
        if key.is_empty() {
            return None;
        }
        let mut state = self.lock_state();
        let job_id = state.locks.holder(key)?;
        match state.jobs.get(&job_id) {
            Some(job) if !job.status.is_terminal() => Some(job.clone()),
            _ => {
                state.locks.clear(key);
                None
            }
        }
    }

    /// Scan every project's job directory and rebuild the in-memory
    /// table. Records that fail to parse are skipped; records left in a
    /// non-terminal status are transitioned to `failed` with
    /// `SERVER_RESTARTED` and their locks released.
    fn load_existing_jobs(&self) {
        let projects = self.inner.projects.list_projects();
        let mut state = self.lock_state();
        let mut loaded = 0usize;
        let mut reconciled = 0usize;

        for project in projects {
            let jobs_dir = self.inner.jobs_dir(&project.id);
            let entries = match fs::read_dir(&jobs_dir) {
                Ok(entries) => entries,
                Err(_) => continue,
            };
            for entry in entries.flatten() {
                if !entry.file_type().is_ok_and(|t| t.is_dir()) {
                    continue;
                }
                let record_path = entry.path().join(RECORD_FILE);
                let Some(job) = read_record(&record_path) else {
                    tracing::warn!(
                        path = %record_path.display(),
                        "Skipping unreadable job record",
                    );
                    continue;
                };

                let job_id = job.job_id;
                let non_terminal = !job.status.is_terminal();
                state.locks.track(&job);
                state.jobs.insert(job_id, job);
                loaded += 1;

                if non_terminal {
                    self.mark_incomplete_as_failed(&mut state, job_id);
                    reconciled += 1;
                }
            }
        }

        tracing::info!(loaded, reconciled, "Recovered persisted generation jobs");
    }

    /// Transition a job interrupted by a process restart to `failed`.
    fn mark_incomplete_as_failed(&self, state: &mut EngineState, job_id: JobId) {
        let Some(job) = state.jobs.get_mut(&job_id) else {
            return;
        };
        job.status = JobStatus::Failed;
        job.step = "server_restarted".into();
        let error = JobError::new(
            CODE_SERVER_RESTARTED,
            "Job stopped because the server restarted",
        );
        job.error = Some(error.clone());
        job.finished_at = Some(chrono::Utc::now());

        let mut payload = progress_fields(&job.step, job.progress);
        payload.insert(
            "error".into(),
            serde_json::to_value(&error).unwrap_or_default(),
        );
        let released = job.clone();
        self.append_event(state, job_id, EVENT_JOB_FAILED, payload);
        state.locks.release(&released);
    }
}

impl EngineInner {
    pub(crate) fn jobs_dir(&self, project_id: &str) -> PathBuf {
        self.projects
            .project_path(project_id, Path::new(JOBS_SUBDIR))
    }

    pub(crate) fn job_dir(&self, job: &Job) -> PathBuf {
        self.jobs_dir(&job.project_id).join(job.job_id.to_string())
    }

    fn write_record(&self, job: &Job) -> std::io::Result<()> {
        let dir = self.job_dir(job);
        fs::create_dir_all(&dir)?;
        let bytes = serde_json::to_vec_pretty(job)?;
        fs::write(dir.join(RECORD_FILE), bytes)
    }

    /// Overwrite `job.json`, logging instead of propagating failures: a
    /// storage hiccup must not mask the job's real outcome.
    pub(crate) fn persist(&self, job: &Job) {
        if let Err(err) = self.write_record(job) {
            tracing::warn!(
                job_id = %job.job_id,
                error = %err,
                "Failed to persist job record",
            );
        }
    }

    pub(crate) fn append_event_line(&self, job: &Job, event: &JobEvent) -> std::io::Result<()> {
        let dir = self.job_dir(job);
        fs::create_dir_all(&dir)?;
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(EVENTS_FILE))?;
        file.write_all(&line)
    }
}

/// Parse a persisted record, tolerating corruption by returning `None`.
fn read_record(path: &Path) -> Option<Job> {
    let bytes = fs::read(path).ok()?;
    serde_json::from_slice(&bytes).ok()
}
