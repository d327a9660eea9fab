//! Generation job engine: durable job store, per-target locking, event
//! log with live fan-out, cooperative job runner, and metrics rollups.
//!
//! The engine owns an in-memory job table mirrored synchronously to disk
//! (`job.json` plus an append-only `events.log` per job). Every mutation
//! happens inside a single critical section, so the lock-conflict check
//! in [`JobEngine::create_job`] and the subsequent lock registration
//! cannot interleave with a concurrent create.
//!
//! The engine does not know what a job *does*: callers hand
//! [`JobEngine::run_job`] an executor future and the runner drives it on
//! a spawned task, translating its outcome into status transitions.

pub mod config;
pub mod events;
pub mod locks;
pub mod metrics;
pub mod projects;
pub mod runner;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use config::EngineConfig;
pub use projects::{FsProjectManager, ProjectManager, ProjectRef};
pub use runner::{JobContext, JobFuture};
pub use store::JobEngine;
