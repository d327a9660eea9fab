//! Executor registry: maps job types to the code that performs them.
//!
//! The engine is deliberately ignorant of what a job does. The hosting
//! application registers one [`ExecutorFactory`] per job type (e.g.
//! `generate-shot`), typically a thin closure over its generation
//! provider clients; submit requests for unregistered types are rejected
//! before a job record is ever created.

use std::collections::HashMap;
use std::sync::Arc;

use shotforge_engine::{JobContext, JobFuture};

/// Builds the executor future for one job run.
pub trait ExecutorFactory: Send + Sync {
    fn run(&self, ctx: JobContext) -> JobFuture;
}

impl<F> ExecutorFactory for F
where
    F: Fn(JobContext) -> JobFuture + Send + Sync,
{
    fn run(&self, ctx: JobContext) -> JobFuture {
        self(ctx)
    }
}

/// Registry of executor factories keyed by job type.
#[derive(Default)]
pub struct ExecutorRegistry {
    factories: HashMap<String, Arc<dyn ExecutorFactory>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the factory for a job type.
    pub fn with(mut self, job_type: impl Into<String>, factory: Arc<dyn ExecutorFactory>) -> Self {
        self.factories.insert(job_type.into(), factory);
        self
    }

    /// Resolve the factory for a job type.
    pub fn get(&self, job_type: &str) -> Option<Arc<dyn ExecutorFactory>> {
        self.factories.get(job_type).cloned()
    }

    /// Job types with a registered executor, for diagnostics.
    pub fn registered_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}
