//! Repository for the `job_queue` table.
//!
//! Enqueueing creates the owning record and the queue row in one
//! transaction, so a worker never claims a job whose record is missing.
//! Claimed rows carry a heartbeat; rows whose worker stopped beating are
//! handed back to the queue by [`JobQueueRepo::requeue_stale`].

use sqlx::PgPool;
use mediaq_core::types::{DbId, JobId};

use crate::models::inference_task::CreateInferenceTask;
use crate::models::queued_job::QueuedJob;
use crate::models::status::{JobStatus, StatusId};

/// Column list for `job_queue` queries.
const COLUMNS: &str = "\
    id, kind, params, status_id, cancel_requested, worker_name, \
    submitted_at, claimed_at, heartbeat_at, finished_at";

const INSERT_QUEUE_ROW: &str = "\
    INSERT INTO job_queue (id, kind, params, status_id) VALUES ($1, $2, $3, $4)";

/// Provides queue operations backed by PostgreSQL.
pub struct JobQueueRepo;

impl JobQueueRepo {
    /// Enqueue a conversion of `media_id`.
    ///
    /// Stamps `job_id` onto the media row and resets its job record columns.
    /// Returns `None` without writing anything if the media row is absent.
    pub async fn enqueue_conversion(
        pool: &PgPool,
        job_id: JobId,
        kind: &str,
        media_id: DbId,
        params: &serde_json::Value,
    ) -> Result<Option<QueuedJob>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let stamped = sqlx::query(
            "UPDATE media SET job_id = $2, status_id = $3, progress = 0, \
                start_time = NULL, end_time = NULL, result = NULL, result_key = NULL, \
                error_message = NULL, error_kind = NULL \
             WHERE id = $1",
        )
        .bind(media_id)
        .bind(job_id)
        .bind(JobStatus::Pending.id())
        .execute(&mut *tx)
        .await?;
        if stamped.rows_affected() == 0 {
            return Ok(None);
        }

        sqlx::query(INSERT_QUEUE_ROW)
            .bind(job_id)
            .bind(kind)
            .bind(params)
            .bind(JobStatus::Pending.id())
            .execute(&mut *tx)
            .await?;

        let job = Self::fetch_in(&mut tx, job_id).await?;
        tx.commit().await?;
        Ok(Some(job))
    }

    /// Enqueue an inference job, inserting its `inference_tasks` row.
    ///
    /// Returns `None` without writing anything if the media or model row
    /// is absent.
    pub async fn enqueue_inference(
        pool: &PgPool,
        input: &CreateInferenceTask,
    ) -> Result<Option<QueuedJob>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO inference_tasks (job_id, kind, media_id, model_id, params, status_id) \
             SELECT $1, $2, $3, $4, $5, $6 \
             WHERE EXISTS (SELECT 1 FROM media WHERE id = $3) \
               AND EXISTS (SELECT 1 FROM detection_models WHERE id = $4)",
        )
        .bind(input.job_id)
        .bind(&input.kind)
        .bind(input.media_id)
        .bind(input.model_id)
        .bind(&input.params)
        .bind(JobStatus::Pending.id())
        .execute(&mut *tx)
        .await?;
        if inserted.rows_affected() == 0 {
            return Ok(None);
        }

        sqlx::query(INSERT_QUEUE_ROW)
            .bind(input.job_id)
            .bind(&input.kind)
            .bind(&input.params)
            .bind(JobStatus::Pending.id())
            .execute(&mut *tx)
            .await?;

        let job = Self::fetch_in(&mut tx, input.job_id).await?;
        tx.commit().await?;
        Ok(Some(job))
    }

    /// Atomically claim the oldest pending job for `worker_name`.
    ///
    /// Uses `SELECT FOR UPDATE SKIP LOCKED` so concurrent workers never
    /// claim the same row. Jobs with a pending cancel request are still
    /// claimed; the worker revokes them without running.
    pub async fn claim_next(
        pool: &PgPool,
        worker_name: &str,
    ) -> Result<Option<QueuedJob>, sqlx::Error> {
        let query = format!(
            "UPDATE job_queue \
             SET worker_name = $1, claimed_at = NOW(), heartbeat_at = NOW(), status_id = $2 \
             WHERE id = ( \
                 SELECT id FROM job_queue \
                 WHERE status_id = $3 \
                 ORDER BY submitted_at ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, QueuedJob>(&query)
            .bind(worker_name)
            .bind(JobStatus::Running.id())
            .bind(JobStatus::Pending.id())
            .fetch_optional(pool)
            .await
    }

    /// Refresh the heartbeat of a running job.
    ///
    /// Returns `false` if the job is not running.
    pub async fn heartbeat(pool: &PgPool, id: JobId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE job_queue SET heartbeat_at = NOW() WHERE id = $1 AND status_id = $2",
        )
        .bind(id)
        .bind(JobStatus::Running.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Return running jobs whose heartbeat is older than `lease_secs` to
    /// the queue.
    ///
    /// The queue row goes back to pending with its claim cleared, and the
    /// owning media or inference task record is reset to pending so the next
    /// execution starts from a clean record. Returns the requeued ids.
    pub async fn requeue_stale(pool: &PgPool, lease_secs: f64) -> Result<Vec<JobId>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let ids: Vec<JobId> = sqlx::query_scalar(
            "UPDATE job_queue \
             SET status_id = $1, worker_name = NULL, claimed_at = NULL, heartbeat_at = NULL \
             WHERE status_id = $2 \
               AND COALESCE(heartbeat_at, claimed_at) < NOW() - make_interval(secs => $3) \
             RETURNING id",
        )
        .bind(JobStatus::Pending.id())
        .bind(JobStatus::Running.id())
        .bind(lease_secs)
        .fetch_all(&mut *tx)
        .await?;

        if !ids.is_empty() {
            for table in ["media", "inference_tasks"] {
                let query = format!(
                    "UPDATE {table} SET status_id = $1, progress = 0, start_time = NULL \
                     WHERE job_id = ANY($2) AND status_id = $3"
                );
                sqlx::query(&query)
                    .bind(JobStatus::Pending.id())
                    .bind(&ids)
                    .bind(JobStatus::Running.id())
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(ids)
    }

    /// Record the terminal status of a claimed job.
    ///
    /// Returns `false` if the job is unknown or already finished.
    pub async fn finish(
        pool: &PgPool,
        id: JobId,
        status: JobStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE job_queue SET status_id = $2, finished_at = NOW() \
             WHERE id = $1 AND finished_at IS NULL",
        )
        .bind(id)
        .bind(status.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Flag a job for cancellation if it has not finished.
    ///
    /// Returns `true` if the flag was set.
    pub async fn request_cancel(pool: &PgPool, id: JobId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE job_queue SET cancel_requested = TRUE \
             WHERE id = $1 AND status_id IN ($2, $3)",
        )
        .bind(id)
        .bind(JobStatus::Pending.id())
        .bind(JobStatus::Running.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// `None` if the job is unknown.
    pub async fn is_cancel_requested(
        pool: &PgPool,
        id: JobId,
    ) -> Result<Option<bool>, sqlx::Error> {
        let row: Option<(bool,)> =
            sqlx::query_as("SELECT cancel_requested FROM job_queue WHERE id = $1")
                .bind(id)
                .fetch_optional(pool)
                .await?;
        Ok(row.map(|(flag,)| flag))
    }

    pub async fn find_by_id(pool: &PgPool, id: JobId) -> Result<Option<QueuedJob>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM job_queue WHERE id = $1");
        sqlx::query_as::<_, QueuedJob>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Count queue rows in a given status.
    pub async fn count_by_status(pool: &PgPool, status: StatusId) -> Result<i64, sqlx::Error> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM job_queue WHERE status_id = $1")
            .bind(status)
            .fetch_one(pool)
            .await?;
        Ok(row.0)
    }

    async fn fetch_in(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        id: JobId,
    ) -> Result<QueuedJob, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM job_queue WHERE id = $1");
        sqlx::query_as::<_, QueuedJob>(&query)
            .bind(id)
            .fetch_one(&mut **tx)
            .await
    }
}
