//! Fixed-size pool of slots draining the job queue.
//!
//! Every slot polls [`JobQueue::claim_next`] on its own ticker and runs the
//! claimed job to completion through the [`JobDispatcher`]. While a job runs,
//! a watcher task refreshes the job's heartbeat, polls the queue's cancel
//! flag and trips the job's [`CancellationToken`]. A reaper hands jobs whose
//! worker stopped heartbeating back to the queue. Shutdown stops claiming;
//! in-flight jobs finish.

use std::sync::Arc;
use std::time::Duration;

use mediaq_core::types::JobId;
use mediaq_pipeline::queue::{ClaimedJob, JobQueue};
use mediaq_pipeline::JobDispatcher;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Default number of concurrent slots.
const DEFAULT_CONCURRENCY: usize = 4;

/// Default interval between queue polls of an idle slot.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default interval between heartbeat and cancel-flag checks of a running job.
const DEFAULT_CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default age of the last heartbeat after which a running job is requeued.
const DEFAULT_STALE_LEASE: Duration = Duration::from_secs(300);

/// Default interval between stale-job sweeps.
const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Slot names are `{name}-{slot}`.
    pub name: String,
    pub concurrency: usize,
    pub poll_interval: Duration,
    pub cancel_poll_interval: Duration,
    pub stale_lease: Duration,
    pub reap_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: "mediaq-worker".into(),
            concurrency: DEFAULT_CONCURRENCY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            cancel_poll_interval: DEFAULT_CANCEL_POLL_INTERVAL,
            stale_lease: DEFAULT_STALE_LEASE,
            reap_interval: DEFAULT_REAP_INTERVAL,
        }
    }
}

pub struct WorkerPool {
    queue: Arc<dyn JobQueue>,
    dispatcher: Arc<JobDispatcher>,
    config: PoolConfig,
}

impl WorkerPool {
    pub fn new(queue: Arc<dyn JobQueue>, dispatcher: Arc<JobDispatcher>, config: PoolConfig) -> Self {
        Self {
            queue,
            dispatcher,
            config,
        }
    }

    /// Run every slot and the stale-job reaper until `shutdown` is cancelled
    /// and the in-flight jobs have finished. The first sweep runs at startup.
    pub async fn run(self, shutdown: CancellationToken) {
        let concurrency = self.config.concurrency.max(1);
        tracing::info!(
            name = %self.config.name,
            concurrency,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Worker pool started",
        );

        let mut slots = JoinSet::new();
        slots.spawn(reap_stale(
            Arc::clone(&self.queue),
            self.config.stale_lease,
            self.config.reap_interval,
            shutdown.clone(),
        ));
        for index in 0..concurrency {
            let slot = Slot {
                name: format!("{}-{index}", self.config.name),
                queue: Arc::clone(&self.queue),
                dispatcher: Arc::clone(&self.dispatcher),
                poll_interval: self.config.poll_interval,
                cancel_poll_interval: self.config.cancel_poll_interval,
            };
            slots.spawn(slot.run(shutdown.clone()));
        }

        while let Some(joined) = slots.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Worker slot panicked");
            }
        }
        tracing::info!(name = %self.config.name, "Worker pool stopped");
    }
}

// ---------------------------------------------------------------------------
// Slot
// ---------------------------------------------------------------------------

struct Slot {
    name: String,
    queue: Arc<dyn JobQueue>,
    dispatcher: Arc<JobDispatcher>,
    poll_interval: Duration,
    cancel_poll_interval: Duration,
}

impl Slot {
    async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!(worker = %self.name, "Worker slot shutting down");
                    break;
                }
                _ = ticker.tick() => self.drain(&shutdown).await,
            }
        }
    }

    /// Claim and run jobs until the queue is empty.
    async fn drain(&self, shutdown: &CancellationToken) {
        while !shutdown.is_cancelled() {
            match self.queue.claim_next(&self.name).await {
                Ok(Some(job)) => self.process(job).await,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(worker = %self.name, error = %e, "Failed to claim job");
                    break;
                }
            }
        }
    }

    async fn process(&self, job: ClaimedJob) {
        tracing::info!(worker = %self.name, job_id = %job.id, kind = %job.kind, "Job claimed");

        let cancel = CancellationToken::new();
        if job.cancel_requested {
            cancel.cancel();
        }
        let watcher = tokio::spawn(watch_job(
            Arc::clone(&self.queue),
            job.id,
            cancel.clone(),
            self.cancel_poll_interval,
        ));

        let outcome = self
            .dispatcher
            .execute_encoded(job.id, &job.kind, &job.params, &cancel)
            .await;
        watcher.abort();

        let status = outcome.status();
        if let Err(e) = self.queue.complete(job.id, status).await {
            tracing::error!(job_id = %job.id, %status, error = %e, "Failed to complete queue entry");
        }
    }
}

/// Every `interval`, refresh the heartbeat of `job_id` and poll its cancel
/// flag. Cancels `token` once the flag is set.
async fn watch_job(
    queue: Arc<dyn JobQueue>,
    job_id: JobId,
    token: CancellationToken,
    interval: Duration,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }
        if let Err(e) = queue.heartbeat(job_id).await {
            tracing::warn!(%job_id, error = %e, "Failed to refresh heartbeat");
        }
        match queue.is_cancel_requested(job_id).await {
            Ok(true) => {
                tracing::info!(%job_id, "Cancellation observed");
                token.cancel();
                return;
            }
            Ok(false) => {}
            Err(e) => tracing::warn!(%job_id, error = %e, "Failed to poll cancel flag"),
        }
    }
}

/// Requeue jobs without a heartbeat for `lease`, every `interval`.
async fn reap_stale(
    queue: Arc<dyn JobQueue>,
    lease: Duration,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => match queue.requeue_stale(lease).await {
                Ok(ids) if !ids.is_empty() => {
                    tracing::info!(count = ids.len(), "Requeued stale jobs");
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Stale job sweep failed"),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use mediaq_core::job::{InferenceParams, JobParams};
    use mediaq_db::models::status::JobStatus;
    use mediaq_pipeline::stager::ResourceStager;
    use mediaq_pipeline::testing::{
        FakeDetector, FakeProber, FakeTranscoder, MemoryBlobStore, MemoryJobQueue, MemoryRecordStore,
    };
    use mediaq_pipeline::Collaborators;

    const BUCKET: &str = "media";

    struct Fixture {
        store: Arc<MemoryRecordStore>,
        blobs: Arc<MemoryBlobStore>,
        detector: Arc<FakeDetector>,
        queue: Arc<MemoryJobQueue>,
        dispatcher: Arc<JobDispatcher>,
        _tmp: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = tempfile::tempdir().unwrap();
            let store = Arc::new(MemoryRecordStore::new());
            let blobs = Arc::new(MemoryBlobStore::new());
            let detector = Arc::new(FakeDetector::new());
            let deps = Collaborators {
                store: store.clone(),
                prober: Arc::new(FakeProber::video(0, 0, 0.0, 0.0)),
                transcoder: Arc::new(FakeTranscoder::new()),
                detector: detector.clone(),
            };
            let stager = ResourceStager::new(blobs.clone(), BUCKET, tmp.path());
            Self {
                queue: Arc::new(MemoryJobQueue::new(store.clone())),
                dispatcher: Arc::new(JobDispatcher::new(deps, stager)),
                store,
                blobs,
                detector,
                _tmp: tmp,
            }
        }

        async fn image_job(&self, name: &str) -> JobId {
            let key = format!("uploads/{name}.jpg");
            self.blobs.insert(BUCKET, &key, b"jpeg".to_vec());
            let media_id = self.store.insert_media(&key, "image");
            let model_id = self.store.insert_model("/models/players.pt");
            self.queue
                .enqueue(&JobParams::RunImageInference(InferenceParams::new(media_id, model_id)))
                .await
                .unwrap()
        }

        fn pool(&self, concurrency: usize) -> WorkerPool {
            let config = PoolConfig {
                name: "test-pool".into(),
                concurrency,
                poll_interval: Duration::from_millis(10),
                cancel_poll_interval: Duration::from_millis(10),
                stale_lease: Duration::from_millis(200),
                reap_interval: Duration::from_millis(10),
            };
            WorkerPool::new(self.queue.clone(), self.dispatcher.clone(), config)
        }

        /// Run the pool until every job in `ids` reached a terminal status.
        async fn drain(&self, concurrency: usize, ids: &[JobId]) {
            let shutdown = CancellationToken::new();
            let handle = tokio::spawn(self.pool(concurrency).run(shutdown.clone()));

            let finished = tokio::time::timeout(Duration::from_secs(5), async {
                loop {
                    let done = ids
                        .iter()
                        .all(|id| self.queue.status(*id).is_some_and(JobStatus::is_terminal));
                    if done {
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            })
            .await;

            shutdown.cancel();
            handle.await.unwrap();
            assert!(finished.is_ok(), "jobs did not finish in time");
        }
    }

    #[tokio::test]
    async fn pool_runs_queued_jobs_to_success() {
        let f = Fixture::new();
        let ids = vec![
            f.image_job("a").await,
            f.image_job("b").await,
            f.image_job("c").await,
        ];

        f.drain(2, &ids).await;

        for id in &ids {
            assert_eq!(f.queue.status(*id), Some(JobStatus::Success));
            assert_eq!(f.store.job_status(*id), Some(JobStatus::Success));
            let worker = f.queue.worker_of(*id).unwrap();
            assert!(worker.starts_with("test-pool-"), "unexpected worker {worker}");
        }
        assert_eq!(f.queue.pending_len(), 0);
        assert_eq!(f.detector.requests().len(), 3);
    }

    #[tokio::test]
    async fn cancelled_before_claim_is_revoked_without_running() {
        let f = Fixture::new();
        let id = f.image_job("late").await;
        assert!(f.queue.request_cancel(id).await.unwrap());

        f.drain(1, &[id]).await;

        assert_eq!(f.queue.status(id), Some(JobStatus::Revoked));
        assert_eq!(f.store.job_status(id), Some(JobStatus::Revoked));
        assert!(f.detector.requests().is_empty());
    }

    #[tokio::test]
    async fn undecodable_and_unknown_jobs_fail() {
        let f = Fixture::new();
        let bad_params = f.queue.push_raw("convert_video", serde_json::json!({ "clipId": 1 }));
        let bad_kind = f.queue.push_raw("transcode_audio", serde_json::json!({ "mediaId": 1 }));

        f.drain(1, &[bad_params, bad_kind]).await;

        assert_eq!(f.queue.status(bad_params), Some(JobStatus::Failure));
        assert_eq!(f.queue.status(bad_kind), Some(JobStatus::Failure));
        assert!(f.detector.requests().is_empty());
    }

    #[tokio::test]
    async fn watcher_cancels_token_once_flag_is_set() {
        let f = Fixture::new();
        let id = f.queue.push_raw("convert_video", serde_json::json!({ "mediaId": 1 }));
        let token = CancellationToken::new();
        let watcher = tokio::spawn(watch_job(
            f.queue.clone(),
            id,
            token.clone(),
            Duration::from_millis(5),
        ));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!token.is_cancelled());

        f.queue.request_cancel(id).await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), token.cancelled())
            .await
            .expect("token cancelled");
        watcher.await.unwrap();
    }

    #[tokio::test]
    async fn job_abandoned_by_crashed_worker_is_rerun() {
        let f = Fixture::new();
        let id = f.image_job("orphan").await;
        let claimed = f.queue.claim_next("crashed-worker").await.unwrap().unwrap();
        assert_eq!(claimed.id, id);
        f.queue.age_heartbeat(id, Duration::from_secs(1));

        f.drain(1, &[id]).await;

        assert_eq!(f.queue.status(id), Some(JobStatus::Success));
        assert_eq!(f.store.job_status(id), Some(JobStatus::Success));
        let worker = f.queue.worker_of(id).unwrap();
        assert!(worker.starts_with("test-pool-"), "unexpected worker {worker}");
    }

    #[tokio::test]
    async fn watcher_keeps_running_job_alive() {
        let f = Fixture::new();
        let id = f.image_job("slow").await;
        f.queue.claim_next("busy-worker").await.unwrap().unwrap();
        f.queue.age_heartbeat(id, Duration::from_secs(1));

        let token = CancellationToken::new();
        let watcher = tokio::spawn(watch_job(
            f.queue.clone(),
            id,
            token.clone(),
            Duration::from_millis(5),
        ));
        tokio::time::sleep(Duration::from_millis(30)).await;

        let requeued = f.queue.requeue_stale(Duration::from_millis(500)).await.unwrap();
        assert!(requeued.is_empty());
        assert_eq!(f.queue.status(id), Some(JobStatus::Running));

        token.cancel();
        watcher.await.unwrap();
    }

    #[tokio::test]
    async fn idle_pool_stops_on_shutdown() {
        let f = Fixture::new();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(f.pool(3).run(shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(30)).await;
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("pool stopped")
            .unwrap();
    }
}
