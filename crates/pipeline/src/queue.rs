//! Job queue seam and its PostgreSQL implementation.

use std::time::Duration;

use async_trait::async_trait;
use mediaq_core::job::JobParams;
use mediaq_core::types::JobId;
use mediaq_db::models::inference_task::CreateInferenceTask;
use mediaq_db::models::queued_job::QueuedJob;
use mediaq_db::models::status::JobStatus;
use mediaq_db::repositories::JobQueueRepo;
use mediaq_db::DbPool;
use uuid::Uuid;

use crate::error::JobError;

/// A job handed to a worker by [`JobQueue::claim_next`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimedJob {
    pub id: JobId,
    /// Queue-facing kind name. Decoded by the dispatcher.
    pub kind: String,
    pub params: serde_json::Value,
    /// Cancellation was requested before the job was claimed.
    pub cancel_requested: bool,
}

impl From<QueuedJob> for ClaimedJob {
    fn from(job: QueuedJob) -> Self {
        Self {
            id: job.id,
            kind: job.kind,
            params: job.params,
            cancel_requested: job.cancel_requested,
        }
    }
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Validate `params`, create the owning record in PENDING and queue the
    /// job. Returns the new execution id.
    async fn enqueue(&self, params: &JobParams) -> Result<JobId, JobError>;

    /// Claim the oldest pending job. At most one worker claims a given job.
    async fn claim_next(&self, worker: &str) -> Result<Option<ClaimedJob>, JobError>;

    /// Record the terminal status of a claimed job.
    async fn complete(&self, job_id: JobId, status: JobStatus) -> Result<(), JobError>;

    /// Ask for a job to stop. Returns `false` if it already finished or is unknown.
    async fn request_cancel(&self, job_id: JobId) -> Result<bool, JobError>;

    async fn is_cancel_requested(&self, job_id: JobId) -> Result<bool, JobError>;

    /// Signal that the claiming worker is still running `job_id`.
    async fn heartbeat(&self, job_id: JobId) -> Result<(), JobError>;

    /// Hand running jobs without a heartbeat for `lease` back to the queue.
    /// Returns the requeued ids.
    async fn requeue_stale(&self, lease: Duration) -> Result<Vec<JobId>, JobError>;
}

#[derive(Clone)]
pub struct PgJobQueue {
    pool: DbPool,
}

impl PgJobQueue {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn enqueue(&self, params: &JobParams) -> Result<JobId, JobError> {
        params.validate()?;
        let job_id = Uuid::now_v7();
        let kind = params.kind();
        let encoded = params.to_json();

        let queued = match params {
            JobParams::ConvertVideo(p) => {
                JobQueueRepo::enqueue_conversion(&self.pool, job_id, kind.as_str(), p.media_id, &encoded)
                    .await?
                    .ok_or_else(|| JobError::not_found("media", p.media_id))?
            }
            JobParams::RunImageInference(p) | JobParams::RunVideoInference(p) => {
                let input = CreateInferenceTask {
                    job_id,
                    kind: kind.as_str().to_string(),
                    media_id: p.media_id,
                    model_id: p.model_id,
                    params: encoded,
                };
                JobQueueRepo::enqueue_inference(&self.pool, &input)
                    .await?
                    .ok_or_else(|| {
                        JobError::not_found("media or detection model", format!("{}/{}", p.media_id, p.model_id))
                    })?
            }
        };

        tracing::info!(job_id = %queued.id, %kind, "Job enqueued");
        Ok(queued.id)
    }

    async fn claim_next(&self, worker: &str) -> Result<Option<ClaimedJob>, JobError> {
        Ok(JobQueueRepo::claim_next(&self.pool, worker)
            .await?
            .map(ClaimedJob::from))
    }

    async fn complete(&self, job_id: JobId, status: JobStatus) -> Result<(), JobError> {
        if !JobQueueRepo::finish(&self.pool, job_id, status).await? {
            tracing::warn!(%job_id, %status, "Queue entry already finished or missing");
        }
        Ok(())
    }

    async fn request_cancel(&self, job_id: JobId) -> Result<bool, JobError> {
        let flagged = JobQueueRepo::request_cancel(&self.pool, job_id).await?;
        if flagged {
            tracing::info!(%job_id, "Cancellation requested");
        }
        Ok(flagged)
    }

    async fn is_cancel_requested(&self, job_id: JobId) -> Result<bool, JobError> {
        JobQueueRepo::is_cancel_requested(&self.pool, job_id)
            .await?
            .ok_or_else(|| JobError::not_found("queued job", job_id))
    }

    async fn heartbeat(&self, job_id: JobId) -> Result<(), JobError> {
        if !JobQueueRepo::heartbeat(&self.pool, job_id).await? {
            tracing::debug!(%job_id, "Heartbeat for a job that is no longer running");
        }
        Ok(())
    }

    async fn requeue_stale(&self, lease: Duration) -> Result<Vec<JobId>, JobError> {
        let ids = JobQueueRepo::requeue_stale(&self.pool, lease.as_secs_f64()).await?;
        for job_id in &ids {
            tracing::warn!(%job_id, lease_secs = lease.as_secs(), "Requeued job abandoned by its worker");
        }
        Ok(ids)
    }
}
