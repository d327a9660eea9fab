//! Event log and subscriber registry.
//!
//! Each job carries two event stores that must not be conflated: a
//! bounded in-memory ring buffer (the last `event_buffer` entries,
//! returned with snapshots) and an unbounded append-only `events.log` on
//! disk. Live fan-out rides a per-job [`broadcast`] channel; dropping a
//! receiver unsubscribes, and a lagging or broken subscriber never
//! affects the job or its other subscribers.

use shotforge_core::error::CoreError;
use shotforge_core::events::JobEvent;
use shotforge_core::job::Job;
use shotforge_core::types::JobId;
use tokio::sync::broadcast;

use crate::store::{EngineState, JobEngine};

/// Standard `{step, progress}` payload attached to lifecycle events.
pub(crate) fn progress_fields(step: &str, progress: u8) -> serde_json::Map<String, serde_json::Value> {
    let mut fields = serde_json::Map::new();
    fields.insert("step".into(), step.into());
    fields.insert("progress".into(), progress.into());
    fields
}

impl JobEngine {
    /// Append an event to a job: ring buffer, `events.log` line, record
    /// persistence, then live fan-out. Disk failures are logged and
    /// swallowed. No-op for unknown job ids.
    pub(crate) fn append_event(
        &self,
        state: &mut EngineState,
        job_id: JobId,
        event: &str,
        data: serde_json::Map<String, serde_json::Value>,
    ) -> Option<JobEvent> {
        let job = state.jobs.get_mut(&job_id)?;
        let event = JobEvent::new(event, job_id, data);

        job.events.push_back(event.clone());
        while job.events.len() > self.inner.config.event_buffer {
            job.events.pop_front();
        }

        if let Err(err) = self.inner.append_event_line(job, &event) {
            tracing::warn!(
                job_id = %job_id,
                error = %err,
                "Failed to append to job event log",
            );
        }
        self.inner.persist(job);

        if let Some(sender) = state.subscribers.get(&job_id) {
            // A send error only means there are zero live receivers.
            let _ = sender.send(event.clone());
        }
        Some(event)
    }

    /// Subscribe to a job's live event stream.
    ///
    /// Events that fired before the subscription are not replayed; use
    /// [`subscribe_with_snapshot`](Self::subscribe_with_snapshot) to get
    /// history and a gap-free live stream in one step. Dropping the
    /// receiver unsubscribes.
    pub fn subscribe(&self, job_id: JobId) -> Result<broadcast::Receiver<JobEvent>, CoreError> {
        self.subscribe_with_snapshot(job_id).map(|(_, rx)| rx)
    }

    /// Atomically snapshot a job and open a live subscription.
    ///
    /// The snapshot's `events` ring buffer holds everything up to the
    /// subscription point and the receiver yields everything after it,
    /// with no gap or overlap between the two.
    pub fn subscribe_with_snapshot(
        &self,
        job_id: JobId,
    ) -> Result<(Job, broadcast::Receiver<JobEvent>), CoreError> {
        let mut state = self.lock_state();
        let Some(job) = state.jobs.get(&job_id) else {
            return Err(CoreError::NotFound {
                entity: "Job",
                id: job_id,
            });
        };
        let job = job.clone();

        let capacity = self.inner.config.event_buffer.max(1);
        let receiver = state
            .subscribers
            .entry(job_id)
            .or_insert_with(|| broadcast::channel(capacity).0)
            .subscribe();

        if job.status.is_terminal() {
            // The final event already fired; close the channel after the
            // usual grace period so this stream still terminates.
            self.schedule_listener_cleanup(job_id);
        }

        Ok((job, receiver))
    }

    /// Drop a job's subscriber channel after the linger period, letting
    /// attached streams observe the final event before the channel
    /// closes. Must be called from within a Tokio runtime.
    pub(crate) fn schedule_listener_cleanup(&self, job_id: JobId) {
        let engine = self.clone();
        let linger = self.inner.config.listener_linger;
        tokio::spawn(async move {
            tokio::time::sleep(linger).await;
            engine.lock_state().subscribers.remove(&job_id);
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use shotforge_core::error::CoreError;
    use shotforge_core::job::{JobError, JobStatus};
    use tokio::sync::broadcast::error::TryRecvError;

    use crate::testing::{engine_at, submit, wait_for_status};
    use crate::JobFuture;

    #[tokio::test]
    async fn fan_out_reaches_every_subscriber() {
        let (_root, engine) = engine_at();
        let job = engine
            .create_job(submit("p1", "generate-shot", "", serde_json::json!({})))
            .expect("create");

        let mut first = engine.subscribe(job.job_id).expect("subscribe");
        let mut second = engine.subscribe(job.job_id).expect("subscribe");

        engine
            .run_job(job.job_id, |ctx| -> JobFuture {
                Box::pin(async move {
                    ctx.set_step("rendering", Some(40));
                    Ok(serde_json::json!({"ok": true}))
                })
            })
            .expect("run");
        wait_for_status(&engine, job.job_id, JobStatus::Completed).await;

        let mut first_events = Vec::new();
        while let Ok(event) = first.try_recv() {
            first_events.push(event.event);
        }
        assert_eq!(
            first_events,
            vec!["job_started", "job_progress", "job_completed"]
        );

        // Dropping one receiver does not affect the other; `second` sees
        // the same sequence independently.
        let mut second_events = Vec::new();
        while let Ok(event) = second.try_recv() {
            second_events.push(event.event);
        }
        assert_eq!(first_events, second_events);
    }

    #[tokio::test]
    async fn subscribe_unknown_job_is_not_found() {
        let (_root, engine) = engine_at();
        let err = engine.subscribe(uuid::Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn snapshot_and_live_stream_do_not_overlap() {
        let (_root, engine) = engine_at();
        let job = engine
            .create_job(submit("p1", "generate-shot", "", serde_json::json!({})))
            .expect("create");

        let (gate_tx, gate_rx) = tokio::sync::oneshot::channel::<()>();
        engine
            .run_job(job.job_id, move |ctx| -> JobFuture {
                Box::pin(async move {
                    ctx.set_step("warming", Some(10));
                    let _ = gate_rx.await;
                    ctx.set_step("rendering", Some(80));
                    Ok(serde_json::json!({}))
                })
            })
            .expect("run");

        // Wait until the first progress event landed, then attach.
        for _ in 0..200 {
            if engine
                .get_job(job.job_id)
                .is_some_and(|j| j.step == "warming")
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let (snapshot, mut live) = engine
            .subscribe_with_snapshot(job.job_id)
            .expect("subscribe");
        let replayed: Vec<&str> = snapshot.events.iter().map(|e| e.event.as_str()).collect();
        assert_eq!(replayed, vec!["job_queued", "job_started", "job_progress"]);

        gate_tx.send(()).expect("release executor");
        wait_for_status(&engine, job.job_id, JobStatus::Completed).await;

        let mut streamed = Vec::new();
        loop {
            match live.try_recv() {
                Ok(event) => streamed.push(event.event),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        assert_eq!(streamed, vec!["job_progress", "job_completed"]);
    }

    #[tokio::test]
    async fn ring_buffer_caps_memory_but_not_disk() {
        let (root, engine) = engine_at();
        let job = engine
            .create_job(submit("p1", "generate-shot", "", serde_json::json!({})))
            .expect("create");

        let emitted = 410usize;
        engine
            .run_job(job.job_id, move |ctx| -> JobFuture {
                Box::pin(async move {
                    for index in 0..emitted {
                        ctx.set_step("rendering", Some((index % 100) as u8));
                    }
                    Ok(serde_json::json!({}))
                })
            })
            .expect("run");
        let finished = wait_for_status(&engine, job.job_id, JobStatus::Completed).await;

        assert_eq!(finished.events.len(), 400);
        // The oldest events were trimmed from memory.
        assert!(finished.events.iter().all(|e| e.event != "job_queued"));

        // The on-disk log keeps the full history: queued + started +
        // every progress event + completed.
        let log_path = root
            .path()
            .join("p1")
            .join(crate::store::JOBS_SUBDIR)
            .join(job.job_id.to_string())
            .join("events.log");
        let log = std::fs::read_to_string(log_path).expect("read log");
        assert_eq!(log.lines().count(), emitted + 3);
    }

    #[tokio::test]
    async fn listener_channel_closes_after_linger() {
        let root = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(root.path().join("p1")).expect("project dir");
        let engine = crate::JobEngine::open(
            std::sync::Arc::new(crate::FsProjectManager::new(root.path())),
            crate::EngineConfig {
                listener_linger: Duration::from_millis(20),
                ..crate::EngineConfig::default()
            },
        );

        let job = engine
            .create_job(submit("p1", "generate-shot", "", serde_json::json!({})))
            .expect("create");
        let mut rx = engine.subscribe(job.job_id).expect("subscribe");

        engine
            .run_job(job.job_id, |_ctx| -> JobFuture {
                Box::pin(async { Err(JobError::failed("boom")) })
            })
            .expect("run");
        wait_for_status(&engine, job.job_id, JobStatus::Failed).await;

        // The receiver drains the final events, then observes the channel
        // closing once the linger elapses.
        let mut saw_failed = false;
        let mut closed = false;
        for _ in 0..200 {
            match rx.try_recv() {
                Ok(event) => saw_failed |= event.event == "job_failed",
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Closed) => {
                    closed = true;
                    break;
                }
                Err(TryRecvError::Empty) => {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            }
        }
        assert!(saw_failed);
        assert!(closed);
    }
}
