//! Handlers for the `/generation-jobs` resource.
//!
//! Thin translation layer over the job engine: validation that belongs to
//! the HTTP surface (executor lookup, query parsing) happens here, while
//! lock conflicts, status transitions, and persistence are the engine's.

use std::collections::HashSet;
use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures::future::Either;
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use shotforge_core::error::CoreError;
use shotforge_core::job::{Job, JobStatus, SubmitJob};
use shotforge_core::types::{JobId, Timestamp};
use shotforge_engine::store::{DEFAULT_LIST_LIMIT, DEFAULT_METRICS_LIMIT};
use shotforge_engine::JobEngine;
use tokio::sync::broadcast::error::RecvError;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn not_found(id: JobId) -> AppError {
    AppError::Core(CoreError::NotFound { entity: "Job", id })
}

/// Enrich a `LockConflict` with the active job's snapshot so the client
/// can redirect to the job that is already running.
fn lock_conflict(engine: &JobEngine, err: CoreError) -> AppError {
    match err {
        CoreError::LockConflict { active_job_id, .. } => AppError::LockConflict {
            active_job_id,
            active_job: engine.get_job(active_job_id).map(Box::new),
        },
        other => AppError::Core(other),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct JobListQuery {
    /// Filter by owning project.
    pub project: Option<String>,
    /// Maximum number of results. Defaults to 50, capped at 200.
    pub limit: Option<usize>,
    /// Filter by job type (case-insensitive).
    #[serde(rename = "type")]
    pub job_type: Option<String>,
    /// Comma-separated status filter, e.g. `running,queued`.
    pub status: Option<String>,
}

/// GET /api/v1/generation-jobs
///
/// List job snapshots, newest first, with optional project, type, and
/// status filters.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<JobListQuery>,
) -> Json<DataResponse<Vec<Job>>> {
    let project = non_empty(params.project);
    let mut jobs = state.engine.list_jobs(
        project.as_deref(),
        params.limit.unwrap_or(DEFAULT_LIST_LIMIT),
    );

    if let Some(filter) = non_empty(params.job_type) {
        jobs.retain(|job| job.job_type.eq_ignore_ascii_case(&filter));
    }
    if let Some(filter) = non_empty(params.status) {
        let statuses: HashSet<String> = filter
            .split(',')
            .map(|status| status.trim().to_lowercase())
            .filter(|status| !status.is_empty())
            .collect();
        if !statuses.is_empty() {
            jobs.retain(|job| statuses.contains(job.status.as_str()));
        }
    }

    Json(DataResponse { data: jobs })
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct MetricsQuery {
    pub project: Option<String>,
    /// Window size. Defaults to 200, capped at 1000.
    pub limit: Option<usize>,
}

/// GET /api/v1/generation-jobs/metrics
pub async fn job_metrics(
    State(state): State<AppState>,
    Query(params): Query<MetricsQuery>,
) -> Json<DataResponse<shotforge_core::metrics::JobMetrics>> {
    let project = non_empty(params.project);
    let metrics = state.engine.get_metrics(
        project.as_deref(),
        params.limit.unwrap_or(DEFAULT_METRICS_LIMIT),
    );
    Json(DataResponse { data: metrics })
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/generation-jobs
///
/// Create a job and start it on the registered executor for its type.
/// Returns 201 with the created job; 409 with the active job snapshot
/// when the lock key is already held.
pub async fn submit_job(
    State(state): State<AppState>,
    Json(input): Json<SubmitJob>,
) -> AppResult<impl IntoResponse> {
    let job_type = input.job_type.trim().to_string();
    let Some(factory) = state.executors.get(&job_type) else {
        return Err(AppError::BadRequest(format!(
            "No executor registered for job type '{job_type}'"
        )));
    };

    let job = state
        .engine
        .create_job(input)
        .map_err(|err| lock_conflict(&state.engine, err))?;
    state
        .engine
        .run_job(job.job_id, move |ctx| factory.run(ctx))?;

    tracing::info!(
        job_id = %job.job_id,
        job_type = %job.job_type,
        project_id = %job.project_id,
        "Generation job submitted",
    );

    Ok((StatusCode::CREATED, Json(DataResponse { data: job })))
}

// ---------------------------------------------------------------------------
// Get
// ---------------------------------------------------------------------------

/// GET /api/v1/generation-jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<Json<DataResponse<Job>>> {
    let job = state.engine.get_job(job_id).ok_or_else(|| not_found(job_id))?;
    Ok(Json(DataResponse { data: job }))
}

// ---------------------------------------------------------------------------
// Cancel
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelAck {
    pub job_id: JobId,
    pub status: &'static str,
}

/// POST /api/v1/generation-jobs/{id}/cancel
///
/// Request cooperative cancellation. 404 for unknown jobs, 409 when the
/// job already reached a terminal status.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<Json<DataResponse<CancelAck>>> {
    if state.engine.get_job(job_id).is_none() {
        return Err(not_found(job_id));
    }
    if !state.engine.cancel_job(job_id) {
        return Err(AppError::Conflict {
            code: "ALREADY_FINISHED",
            message: "Job is already finished and cannot be canceled".into(),
        });
    }
    Ok(Json(DataResponse {
        data: CancelAck {
            job_id,
            status: "cancel_requested",
        },
    }))
}

// ---------------------------------------------------------------------------
// Retry
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct RetryRequest {
    /// Fields shallow-merged into the source job's input.
    #[serde(default)]
    pub overrides: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetriedJob {
    pub retried_from: JobId,
    pub job: Job,
}

/// POST /api/v1/generation-jobs/{id}/retry
///
/// Create a fresh job from a terminal job's type, lock key, and input.
/// The source must already be terminal (409 `SOURCE_JOB_ACTIVE`
/// otherwise); retrying is explicit, there is no automatic retry.
pub async fn retry_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
    body: Option<Json<RetryRequest>>,
) -> AppResult<impl IntoResponse> {
    let source = state.engine.get_job(job_id).ok_or_else(|| not_found(job_id))?;
    if !source.status.is_terminal() {
        return Err(AppError::Conflict {
            code: "SOURCE_JOB_ACTIVE",
            message: "Cannot retry while source job is still active".into(),
        });
    }

    let Some(factory) = state.executors.get(&source.job_type) else {
        return Err(AppError::BadRequest(format!(
            "No executor registered for job type '{}'",
            source.job_type
        )));
    };

    let mut input = source.input.clone();
    if let Some(Json(request)) = body {
        if let (Some(target), Some(overrides)) = (input.as_object_mut(), request.overrides) {
            for (key, value) in overrides {
                target.insert(key, value);
            }
        }
    }

    let job = state
        .engine
        .create_job(SubmitJob {
            project_id: source.project_id.clone(),
            job_type: source.job_type.clone(),
            lock_key: source.lock_key.clone(),
            input,
        })
        .map_err(|err| lock_conflict(&state.engine, err))?;
    state
        .engine
        .run_job(job.job_id, move |ctx| factory.run(ctx))?;

    tracing::info!(
        source_job_id = %job_id,
        new_job_id = %job.job_id,
        "Generation job retried",
    );

    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: RetriedJob {
                retried_from: job_id,
                job,
            },
        }),
    ))
}

// ---------------------------------------------------------------------------
// Event stream
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StreamOpen {
    event: &'static str,
    job_id: JobId,
    status: JobStatus,
    timestamp: Timestamp,
}

fn sse_event<T: Serialize>(payload: &T) -> Event {
    Event::default()
        .json_data(payload)
        .unwrap_or_else(|_| Event::default().comment("unserializable event"))
}

/// GET /api/v1/generation-jobs/{id}/events
///
/// Server-sent events for one job: a `stream_open` marker, the buffered
/// event history, then live events. The stream ends once a terminal
/// event has been delivered (or, for late subscribers to an already
/// terminal job, right after the replay).
pub async fn job_events(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let (job, receiver) = state
        .engine
        .subscribe_with_snapshot(job_id)
        .map_err(AppError::Core)?;

    let mut backlog = Vec::with_capacity(job.events.len() + 1);
    backlog.push(sse_event(&StreamOpen {
        event: "stream_open",
        job_id,
        status: job.status,
        timestamp: chrono::Utc::now(),
    }));
    for event in &job.events {
        backlog.push(sse_event(event));
    }

    let live = if job.status.is_terminal() {
        // The replayed history already contains the final event.
        Either::Left(stream::empty())
    } else {
        Either::Right(stream::unfold(Some(receiver), |receiver| async move {
            let mut receiver = receiver?;
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        let terminal = event.is_terminal();
                        let item = sse_event(&event);
                        return Some((item, if terminal { None } else { Some(receiver) }));
                    }
                    // Skipped events are still in the snapshot on disk;
                    // keep streaming from where the channel caught up.
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => return None,
                }
            }
        }))
    };

    let stream = stream::iter(backlog).chain(live).map(Ok::<_, Infallible>);
    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(state.config.sse_keepalive_secs))
            .text("ping"),
    ))
}
