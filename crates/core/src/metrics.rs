//! Metrics rollup types and the pure math behind them.
//!
//! The engine's aggregator selects a recent window of jobs and delegates
//! the arithmetic to the helpers here so the formulas stay independently
//! testable.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::job::JobStatus;
use crate::types::{JobId, Timestamp};

/// Per-status job totals inside a metrics window.
///
/// `other` exists for wire compatibility with older records; the status
/// enum is closed, so it is always zero here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub total: u64,
    pub queued: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
    pub canceled: u64,
    pub other: u64,
}

impl StatusCounts {
    pub fn record(&mut self, status: JobStatus) {
        self.total += 1;
        match status {
            JobStatus::Queued => self.queued += 1,
            JobStatus::Running => self.running += 1,
            JobStatus::Completed => self.completed += 1,
            JobStatus::Failed => self.failed += 1,
            JobStatus::Canceled => self.canceled += 1,
        }
    }

    /// Number of jobs that reached a terminal status.
    pub fn terminal(&self) -> u64 {
        self.completed + self.failed + self.canceled
    }
}

/// One entry of the top-failure-codes ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureCodeCount {
    pub code: String,
    pub count: u64,
}

/// A lock currently held by a non-terminal job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveLock {
    pub lock_key: String,
    pub job_id: JobId,
    pub project_id: String,
    #[serde(rename = "type")]
    pub job_type: String,
    pub status: JobStatus,
}

/// Compact summary of one recent job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentJob {
    pub job_id: JobId,
    #[serde(rename = "type")]
    pub job_type: String,
    pub status: JobStatus,
    pub step: String,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    pub error_code: Option<String>,
}

/// Rollup statistics over a bounded recent window of jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMetrics {
    pub project_id: String,
    pub limit: usize,
    pub counts: StatusCounts,
    pub by_type: BTreeMap<String, u64>,
    pub success_rate: f64,
    pub avg_duration_sec: f64,
    pub p95_duration_sec: f64,
    pub top_failure_codes: Vec<FailureCodeCount>,
    pub active_locks: Vec<ActiveLock>,
    pub recent: Vec<RecentJob>,
}

/// Round to two decimal places, the precision of the wire format.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `completed / terminal * 100`, rounded to two decimals; `0` when no job
/// has reached a terminal status yet.
pub fn success_rate(counts: &StatusCounts) -> f64 {
    let terminal = counts.terminal();
    if terminal == 0 {
        return 0.0;
    }
    round2(counts.completed as f64 / terminal as f64 * 100.0)
}

/// Mean of `values`, rounded to two decimals; `0` for an empty slice.
pub fn average(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    round2(values.iter().sum::<f64>() / values.len() as f64)
}

/// 95th percentile over ascending-sorted durations.
///
/// Index is `ceil(n * 0.95) - 1`, clamped to `[0, n-1]`.
pub fn p95(sorted: &[f64]) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let index = ((sorted.len() as f64 * 0.95).ceil() as usize)
        .saturating_sub(1)
        .min(sorted.len() - 1);
    round2(sorted[index])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(completed: u64, failed: u64, canceled: u64) -> StatusCounts {
        StatusCounts {
            total: completed + failed + canceled,
            completed,
            failed,
            canceled,
            ..StatusCounts::default()
        }
    }

    #[test]
    fn success_rate_three_of_four() {
        assert_eq!(success_rate(&counts(3, 1, 0)), 75.0);
    }

    #[test]
    fn success_rate_rounds_to_two_decimals() {
        // 1 of 3 terminal -> 33.333... -> 33.33
        assert_eq!(success_rate(&counts(1, 2, 0)), 33.33);
    }

    #[test]
    fn success_rate_zero_without_terminal_jobs() {
        let mut c = StatusCounts::default();
        c.record(JobStatus::Queued);
        c.record(JobStatus::Running);
        assert_eq!(success_rate(&c), 0.0);
    }

    #[test]
    fn p95_matches_manual_computation() {
        // n = 5 -> index ceil(4.75) - 1 = 4
        let durations = [0.5, 1.0, 2.0, 3.0, 10.0];
        assert_eq!(p95(&durations), 10.0);

        // n = 20 -> index ceil(19.0) - 1 = 18
        let long: Vec<f64> = (1..=20).map(f64::from).collect();
        assert_eq!(p95(&long), 19.0);

        assert_eq!(p95(&[4.2]), 4.2);
        assert_eq!(p95(&[]), 0.0);
    }

    #[test]
    fn average_rounds() {
        assert_eq!(average(&[1.0, 2.0]), 1.5);
        assert_eq!(average(&[1.0, 1.0, 2.0]), 1.33);
        assert_eq!(average(&[]), 0.0);
    }

    #[test]
    fn status_counts_record() {
        let mut c = StatusCounts::default();
        c.record(JobStatus::Completed);
        c.record(JobStatus::Completed);
        c.record(JobStatus::Failed);
        c.record(JobStatus::Queued);
        assert_eq!(c.total, 4);
        assert_eq!(c.completed, 2);
        assert_eq!(c.terminal(), 3);
        assert_eq!(c.other, 0);
    }
}
