//! Per-target mutual exclusion bookkeeping.

use std::collections::HashMap;

use shotforge_core::job::Job;
use shotforge_core::types::JobId;

/// Maps lock keys to the job currently holding them.
///
/// The index is bookkeeping only; the job table stays the source of truth
/// for whether a holder is still active. Callers clear stale entries via
/// [`LockIndex::clear`] when the mapped job turns out to be terminal.
#[derive(Debug, Default)]
pub(crate) struct LockIndex {
    held: HashMap<String, JobId>,
}

impl LockIndex {
    /// Register `lockKey -> jobId` for a non-terminal job with a non-empty
    /// lock key; a no-op otherwise.
    pub fn track(&mut self, job: &Job) {
        if job.lock_key.is_empty() || job.status.is_terminal() {
            return;
        }
        self.held.insert(job.lock_key.clone(), job.job_id);
    }

    /// Remove the mapping only if `job` is the current holder, so a lock
    /// already reassigned to a newer job is left untouched.
    pub fn release(&mut self, job: &Job) {
        if job.lock_key.is_empty() {
            return;
        }
        if self.held.get(&job.lock_key) == Some(&job.job_id) {
            self.held.remove(&job.lock_key);
        }
    }

    pub fn holder(&self, lock_key: &str) -> Option<JobId> {
        self.held.get(lock_key).copied()
    }

    pub fn clear(&mut self, lock_key: &str) {
        self.held.remove(lock_key);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &JobId)> {
        self.held.iter()
    }
}
