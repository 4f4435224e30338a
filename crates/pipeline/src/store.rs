//! Record store seam and its PostgreSQL adapter.
//!
//! Lookups return `Option` so an absent row is distinct from a failed query.

use async_trait::async_trait;
use mediaq_core::job::JobKind;
use mediaq_core::types::{DbId, JobId};
use mediaq_db::models::detection_model::DetectionModel;
use mediaq_db::models::inference_task::InferenceTask;
use mediaq_db::models::job_record::UpdateJobRecord;
use mediaq_db::models::media::{Media, UpdateMediaMetadata};
use mediaq_db::repositories::{DetectionModelRepo, InferenceTaskRepo, MediaRepo};
use mediaq_db::DbPool;

use crate::error::JobError;

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find_media(&self, id: DbId) -> Result<Option<Media>, JobError>;

    async fn find_model(&self, id: DbId) -> Result<Option<DetectionModel>, JobError>;

    /// The inference task owned by `job_id`.
    async fn find_task(&self, job_id: JobId) -> Result<Option<InferenceTask>, JobError>;

    async fn update_media_metadata(
        &self,
        id: DbId,
        patch: &UpdateMediaMetadata,
    ) -> Result<(), JobError>;

    /// Merge `patch` into the row owning `job_id`: the media row for
    /// conversions, the inference task otherwise.
    ///
    /// Returns `false` if no row owns the job.
    async fn update_job_record(
        &self,
        kind: JobKind,
        job_id: JobId,
        patch: &UpdateJobRecord,
    ) -> Result<bool, JobError>;
}

/// [`RecordStore`] backed by the `mediaq-db` repositories.
#[derive(Clone)]
pub struct PgRecordStore {
    pool: DbPool,
}

impl PgRecordStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn find_media(&self, id: DbId) -> Result<Option<Media>, JobError> {
        Ok(MediaRepo::find_by_id(&self.pool, id).await?)
    }

    async fn find_model(&self, id: DbId) -> Result<Option<DetectionModel>, JobError> {
        Ok(DetectionModelRepo::find_by_id(&self.pool, id).await?)
    }

    async fn find_task(&self, job_id: JobId) -> Result<Option<InferenceTask>, JobError> {
        Ok(InferenceTaskRepo::find_by_job_id(&self.pool, job_id).await?)
    }

    async fn update_media_metadata(
        &self,
        id: DbId,
        patch: &UpdateMediaMetadata,
    ) -> Result<(), JobError> {
        MediaRepo::update_metadata(&self.pool, id, patch)
            .await?
            .ok_or_else(|| JobError::not_found("media", id))?;
        Ok(())
    }

    async fn update_job_record(
        &self,
        kind: JobKind,
        job_id: JobId,
        patch: &UpdateJobRecord,
    ) -> Result<bool, JobError> {
        let updated = if kind.is_inference() {
            InferenceTaskRepo::update_job_record(&self.pool, job_id, patch).await?
        } else {
            MediaRepo::update_job_record(&self.pool, job_id, patch).await?
        };
        Ok(updated)
    }
}
