//! Repository for the `media` table.

use sqlx::PgPool;
use mediaq_core::types::{DbId, JobId};

use crate::models::job_record::{UpdateJobRecord, JOB_RECORD_MERGE};
use crate::models::media::{CreateMedia, Media, UpdateMediaMetadata};

use super::bind_job_record;

/// Column list for `media` queries.
const COLUMNS: &str = "\
    id, blob_key, original_name, media_type, \
    width, height, duration_secs, video_codec, file_extension, \
    job_id, status_id, progress, start_time, end_time, \
    result, result_key, error_message, error_kind, \
    created_at, updated_at";

/// Provides lookups and partial updates for media rows.
pub struct MediaRepo;

impl MediaRepo {
    /// Register an uploaded file.
    pub async fn create(pool: &PgPool, input: &CreateMedia) -> Result<Media, sqlx::Error> {
        let query = format!(
            "INSERT INTO media (blob_key, original_name, media_type) \
             VALUES ($1, $2, COALESCE($3, 'video')) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Media>(&query)
            .bind(&input.blob_key)
            .bind(&input.original_name)
            .bind(&input.media_type)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Media>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM media WHERE id = $1");
        sqlx::query_as::<_, Media>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find the media row whose conversion job is `job_id`.
    pub async fn find_by_job_id(
        pool: &PgPool,
        job_id: JobId,
    ) -> Result<Option<Media>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM media WHERE job_id = $1");
        sqlx::query_as::<_, Media>(&query)
            .bind(job_id)
            .fetch_optional(pool)
            .await
    }

    /// Merge transcoding metadata into a media row. `None` fields are kept.
    pub async fn update_metadata(
        pool: &PgPool,
        id: DbId,
        input: &UpdateMediaMetadata,
    ) -> Result<Option<Media>, sqlx::Error> {
        let query = format!(
            "UPDATE media SET \
                blob_key = COALESCE($2, blob_key), \
                width = COALESCE($3, width), \
                height = COALESCE($4, height), \
                duration_secs = COALESCE($5, duration_secs), \
                video_codec = COALESCE($6, video_codec), \
                file_extension = COALESCE($7, file_extension), \
                progress = COALESCE($8, progress) \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Media>(&query)
            .bind(id)
            .bind(&input.blob_key)
            .bind(input.width)
            .bind(input.height)
            .bind(input.duration_secs)
            .bind(&input.video_codec)
            .bind(&input.file_extension)
            .bind(input.progress)
            .fetch_optional(pool)
            .await
    }

    /// Merge job record fields into the row owned by conversion `job_id`.
    ///
    /// Returns `false` if no row carries that job id.
    pub async fn update_job_record(
        pool: &PgPool,
        job_id: JobId,
        patch: &UpdateJobRecord,
    ) -> Result<bool, sqlx::Error> {
        let query = format!("UPDATE media SET {JOB_RECORD_MERGE} WHERE job_id = $1");
        let result = bind_job_record(sqlx::query(&query).bind(job_id), patch)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
