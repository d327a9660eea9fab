//! Rollup statistics over the recent job history.

use std::cmp::Ordering;
use std::collections::HashMap;

use shotforge_core::job::{Job, JobStatus};
use shotforge_core::metrics::{
    self, ActiveLock, FailureCodeCount, JobMetrics, RecentJob, StatusCounts,
};

use crate::store::JobEngine;

/// Number of jobs summarized in the `recent` list.
const RECENT_WINDOW: usize = 12;

/// Number of entries in the `topFailureCodes` ranking.
const TOP_FAILURE_CODES: usize = 5;

fn failure_code(job: &Job) -> String {
    job.error
        .as_ref()
        .map(|err| {
            let code = err.code.trim();
            if code.is_empty() {
                err.message.trim().to_string()
            } else {
                code.to_string()
            }
        })
        .filter(|code| !code.is_empty())
        .unwrap_or_else(|| "UNKNOWN".to_string())
}

impl JobEngine {
    /// Compute operational metrics over the most recent `limit` jobs
    /// (clamped to `[1, 1000]`), optionally filtered by project.
    pub fn get_metrics(&self, project_id: Option<&str>, limit: usize) -> JobMetrics {
        let limit = limit.clamp(1, 1000);
        let state = self.lock_state();

        let mut window: Vec<&Job> = state
            .jobs
            .values()
            .filter(|job| project_id.map_or(true, |p| job.project_id == p))
            .collect();
        window.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        window.truncate(limit);

        let mut counts = StatusCounts::default();
        let mut by_type = std::collections::BTreeMap::new();
        let mut failure_codes: HashMap<String, u64> = HashMap::new();
        let mut durations: Vec<f64> = Vec::new();

        for job in &window {
            counts.record(job.status);
            *by_type.entry(job.job_type.clone()).or_insert(0) += 1;
            if job.status == JobStatus::Failed {
                *failure_codes.entry(failure_code(job)).or_insert(0) += 1;
            }
            if let Some(secs) = job.duration_secs() {
                durations.push(secs);
            }
        }

        durations.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

        let mut top_failure_codes: Vec<FailureCodeCount> = failure_codes
            .into_iter()
            .map(|(code, count)| FailureCodeCount { code, count })
            .collect();
        top_failure_codes.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.code.cmp(&b.code)));
        top_failure_codes.truncate(TOP_FAILURE_CODES);

        let mut active_locks: Vec<ActiveLock> = state
            .locks
            .iter()
            .filter_map(|(lock_key, job_id)| {
                state
                    .jobs
                    .get(job_id)
                    .filter(|job| !job.status.is_terminal())
                    .map(|job| ActiveLock {
                        lock_key: lock_key.clone(),
                        job_id: *job_id,
                        project_id: job.project_id.clone(),
                        job_type: job.job_type.clone(),
                        status: job.status,
                    })
            })
            .collect();
        active_locks.sort_by(|a, b| a.lock_key.cmp(&b.lock_key));

        let recent: Vec<RecentJob> = window
            .iter()
            .take(RECENT_WINDOW)
            .map(|job| RecentJob {
                job_id: job.job_id,
                job_type: job.job_type.clone(),
                status: job.status,
                step: job.step.clone(),
                created_at: job.created_at,
                started_at: job.started_at,
                finished_at: job.finished_at,
                error_code: job.error.as_ref().map(|err| err.code.clone()),
            })
            .collect();

        JobMetrics {
            project_id: project_id.unwrap_or_default().to_string(),
            limit,
            success_rate: metrics::success_rate(&counts),
            avg_duration_sec: metrics::average(&durations),
            p95_duration_sec: metrics::p95(&durations),
            counts,
            by_type,
            top_failure_codes,
            active_locks,
            recent,
        }
    }
}
