//! Shared domain types for the shotforge generation job engine.
//!
//! This crate holds the job record and status machine, lifecycle event
//! records, metrics rollup types with their pure math, and the common
//! [`error::CoreError`] type. It has no I/O; the engine crate owns all
//! persistence and runtime behavior.

pub mod error;
pub mod events;
pub mod job;
pub mod metrics;
pub mod types;
