//! Repository for the `inference_tasks` table.

use sqlx::PgPool;
use mediaq_core::types::{DbId, JobId};

use crate::models::inference_task::InferenceTask;
use crate::models::job_record::{UpdateJobRecord, JOB_RECORD_MERGE};

use super::bind_job_record;

/// Column list for `inference_tasks` queries.
const COLUMNS: &str = "\
    id, kind, media_id, model_id, params, \
    job_id, status_id, progress, start_time, end_time, \
    result, result_key, error_message, error_kind, \
    created_at, updated_at";

/// Provides lookups and partial updates for inference tasks.
///
/// Rows are inserted by [`super::JobQueueRepo::enqueue_inference`] together
/// with their queue entry.
pub struct InferenceTaskRepo;

impl InferenceTaskRepo {
    pub async fn find_by_job_id(
        pool: &PgPool,
        job_id: JobId,
    ) -> Result<Option<InferenceTask>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM inference_tasks WHERE job_id = $1");
        sqlx::query_as::<_, InferenceTask>(&query)
            .bind(job_id)
            .fetch_optional(pool)
            .await
    }

    /// All tasks run against one media row, newest first.
    pub async fn list_by_media(
        pool: &PgPool,
        media_id: DbId,
    ) -> Result<Vec<InferenceTask>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM inference_tasks WHERE media_id = $1 ORDER BY id DESC"
        );
        sqlx::query_as::<_, InferenceTask>(&query)
            .bind(media_id)
            .fetch_all(pool)
            .await
    }

    /// Merge job record fields into the task owned by `job_id`.
    ///
    /// Returns `false` if no task carries that job id.
    pub async fn update_job_record(
        pool: &PgPool,
        job_id: JobId,
        patch: &UpdateJobRecord,
    ) -> Result<bool, sqlx::Error> {
        let query = format!("UPDATE inference_tasks SET {JOB_RECORD_MERGE} WHERE job_id = $1");
        let result = bind_job_record(sqlx::query(&query).bind(job_id), patch)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
