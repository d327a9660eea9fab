//! Route definitions for the `/generation-jobs` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// Routes mounted at `/generation-jobs`.
///
/// ```text
/// GET    /               -> list_jobs
/// POST   /               -> submit_job
/// GET    /metrics        -> job_metrics
/// GET    /{id}           -> get_job
/// POST   /{id}/cancel    -> cancel_job
/// POST   /{id}/retry     -> retry_job
/// GET    /{id}/events    -> job_events (SSE)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(jobs::list_jobs).post(jobs::submit_job))
        .route("/metrics", get(jobs::job_metrics))
        .route("/{id}", get(jobs::get_job))
        .route("/{id}/cancel", post(jobs::cancel_job))
        .route("/{id}/retry", post(jobs::retry_job))
        .route("/{id}/events", get(jobs::job_events))
}
