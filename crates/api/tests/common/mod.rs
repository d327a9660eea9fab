//! Shared helpers for API integration tests.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use shotforge_api::config::ServerConfig;
use shotforge_api::executors::ExecutorRegistry;
use shotforge_api::state::AppState;
use shotforge_core::job::JobError;
use shotforge_engine::{
    EngineConfig, FsProjectManager, JobContext, JobEngine, JobFuture,
};
use tower::ServiceExt;

/// Build a test app over `root` with three registered executors:
///
/// - `generate-shot`: emits progress, then succeeds with `{"ok": true}`.
/// - `slow-loop`: polls the cancellation flag forever.
/// - `always-fail`: fails with code `PROVIDER_DOWN`.
pub fn build_test_app(root: &Path) -> Router {
    std::fs::create_dir_all(root.join("p1")).expect("project dir");

    let engine = JobEngine::open(
        Arc::new(FsProjectManager::new(root)),
        EngineConfig::default(),
    );

    let executors = ExecutorRegistry::new()
        .with(
            "generate-shot",
            Arc::new(|ctx: JobContext| -> JobFuture {
                Box::pin(async move {
                    ctx.set_step("rendering", Some(40));
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    ctx.check_canceled()?;
                    Ok(serde_json::json!({"ok": true}))
                })
            }),
        )
        .with(
            "slow-loop",
            Arc::new(|ctx: JobContext| -> JobFuture {
                Box::pin(async move {
                    loop {
                        ctx.check_canceled()?;
                        tokio::time::sleep(Duration::from_millis(5)).await;
                    }
                })
            }),
        )
        .with(
            "always-fail",
            Arc::new(|_ctx: JobContext| -> JobFuture {
                Box::pin(async {
                    Err(JobError::new("PROVIDER_DOWN", "upstream rejected the request"))
                })
            }),
        );

    shotforge_api::app(AppState {
        engine,
        executors: Arc::new(executors),
        config: Arc::new(ServerConfig::default()),
    })
}

pub async fn get(app: Router, uri: &str) -> Response {
    let request = Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    app.oneshot(request).await.expect("send request")
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("build request");
    app.oneshot(request).await.expect("send request")
}

pub async fn post_empty(app: Router, uri: &str) -> Response {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    app.oneshot(request).await.expect("send request")
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("parse body")
}

pub async fn body_text(response: Response) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("utf8 body")
}

/// Poll `GET /api/v1/generation-jobs/{id}` until the job reports
/// `status`, panicking after ~2s.
pub async fn wait_for_status(app: &Router, job_id: &str, status: &str) -> serde_json::Value {
    for _ in 0..200 {
        let response = get(app.clone(), &format!("/api/v1/generation-jobs/{job_id}")).await;
        let json = body_json(response).await;
        if json["data"]["status"] == status {
            return json["data"].clone();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} did not reach status {status} in time");
}
