use std::sync::Arc;

use shotforge_engine::JobEngine;

use crate::config::ServerConfig;
use crate::executors::ExecutorRegistry;

/// Shared application state available to all handlers via `State<AppState>`.
///
/// Cheaply cloneable; inner data is behind `Arc` or is already `Clone`.
#[derive(Clone)]
pub struct AppState {
    /// The generation job engine.
    pub engine: JobEngine,
    /// Executor factories keyed by job type, registered by the host.
    pub executors: Arc<ExecutorRegistry>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
}
