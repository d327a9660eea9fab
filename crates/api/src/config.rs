/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development. In
/// production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    /// A single `*` entry allows any origin.
    pub cors_origins: Vec<String>,
    /// Keep-alive comment interval for SSE event streams, in seconds.
    pub sse_keepalive_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var              | Default                 |
    /// |----------------------|-------------------------|
    /// | `CORS_ORIGINS`       | `http://localhost:5173` |
    /// | `SSE_KEEPALIVE_SECS` | `15`                    |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .map(|value| {
                value
                    .split(',')
                    .map(|origin| origin.trim().to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect()
            })
            .unwrap_or(defaults.cors_origins);

        let sse_keepalive_secs = std::env::var("SSE_KEEPALIVE_SECS")
            .ok()
            .and_then(|value| value.parse().ok())
            .filter(|&secs: &u64| secs > 0)
            .unwrap_or(defaults.sse_keepalive_secs);

        Self {
            cors_origins,
            sse_keepalive_secs,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            cors_origins: vec!["http://localhost:5173".into()],
            sse_keepalive_secs: 15,
        }
    }
}
