//! Shared helpers for engine tests.

use std::sync::Arc;
use std::time::Duration;

use shotforge_core::job::{Job, JobStatus, SubmitJob};
use shotforge_core::types::JobId;
use tempfile::TempDir;

use crate::{EngineConfig, FsProjectManager, JobEngine};

/// Engine over a fresh temporary projects root containing project `p1`.
pub(crate) fn engine_at() -> (TempDir, JobEngine) {
    let root = tempfile::tempdir().expect("tempdir");
    std::fs::create_dir_all(root.path().join("p1")).expect("project dir");
    let engine = JobEngine::open(
        Arc::new(FsProjectManager::new(root.path())),
        EngineConfig::default(),
    );
    (root, engine)
}

pub(crate) fn submit(
    project: &str,
    job_type: &str,
    lock_key: &str,
    input: serde_json::Value,
) -> SubmitJob {
    SubmitJob {
        project_id: project.into(),
        job_type: job_type.into(),
        lock_key: lock_key.into(),
        input,
    }
}

/// Poll until the job reaches `status`, panicking after ~1s.
pub(crate) async fn wait_for_status(engine: &JobEngine, job_id: JobId, status: JobStatus) -> Job {
    for _ in 0..200 {
        if let Some(job) = engine.get_job(job_id) {
            if job.status == status {
                return job;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("job {job_id} did not reach {status:?} in time");
}
