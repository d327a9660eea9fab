use std::time::Duration;

/// In-memory per-job event ring buffer capacity. The on-disk `events.log`
/// is unbounded and keeps the full history.
pub const DEFAULT_EVENT_BUFFER: usize = 400;

/// How long subscriber channels stay open after a job reaches a terminal
/// status, so attached streams can deliver the final event before the
/// channel closes.
pub const DEFAULT_LISTENER_LINGER_MS: u64 = 5_000;

/// Engine configuration.
///
/// All fields have defaults suitable for production; override via
/// environment variables where needed.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// In-memory event ring buffer capacity per job.
    pub event_buffer: usize,
    /// Grace period before terminal jobs drop their subscriber channel.
    pub listener_linger: Duration,
}

impl EngineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default |
    /// |--------------------------|---------|
    /// | `JOB_EVENT_BUFFER`       | `400`   |
    /// | `JOB_LISTENER_LINGER_MS` | `5000`  |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let event_buffer = std::env::var("JOB_EVENT_BUFFER")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|&n: &usize| n > 0)
            .unwrap_or(defaults.event_buffer);

        let listener_linger = std::env::var("JOB_LISTENER_LINGER_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.listener_linger);

        Self {
            event_buffer,
            listener_linger,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_buffer: DEFAULT_EVENT_BUFFER,
            listener_linger: Duration::from_millis(DEFAULT_LISTENER_LINGER_MS),
        }
    }
}
