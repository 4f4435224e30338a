//! The three job pipelines.
//!
//! All share one shape: resolve referenced records, stage input, work while
//! reporting progress, stage output, finalize the owning record. Temp files
//! are [`StagedFile`](crate::stager::StagedFile) guards owned by the
//! pipeline function, so every exit path releases them.

pub mod convert;
pub mod image_inference;
pub mod video_inference;

use std::sync::Arc;

use mediaq_core::types::{DbId, JobId};
use mediaq_db::models::detection_model::DetectionModel;
use mediaq_db::models::inference_task::InferenceTask;
use mediaq_db::models::media::Media;
use tokio_util::sync::CancellationToken;

use crate::detector::Detector;
use crate::error::JobError;
use crate::progress::ProgressReporter;
use crate::stager::ResourceStager;
use crate::store::RecordStore;
use crate::tools::{Prober, Transcoder};

/// Shared collaborator handles, injected once at startup.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn RecordStore>,
    pub prober: Arc<dyn Prober>,
    pub transcoder: Arc<dyn Transcoder>,
    pub detector: Arc<dyn Detector>,
}

/// What a successful pipeline hands to the success hook.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    /// Blob key of the uploaded artifact.
    pub result_key: String,
    pub result: serde_json::Value,
}

impl PipelineOutput {
    pub fn new(result_key: impl Into<String>, result: serde_json::Value) -> Self {
        Self {
            result_key: result_key.into(),
            result,
        }
    }
}

/// Per-execution view of the engine handed to a pipeline.
pub struct JobContext<'a> {
    pub job_id: JobId,
    pub deps: &'a Collaborators,
    pub stager: &'a ResourceStager,
    pub progress: &'a ProgressReporter,
    pub cancel: &'a CancellationToken,
}

impl JobContext<'_> {
    pub(crate) async fn require_media(&self, id: DbId) -> Result<Media, JobError> {
        self.deps
            .store
            .find_media(id)
            .await?
            .ok_or_else(|| JobError::not_found("media", id))
    }

    pub(crate) async fn require_model(&self, id: DbId) -> Result<DetectionModel, JobError> {
        self.deps
            .store
            .find_model(id)
            .await?
            .ok_or_else(|| JobError::not_found("detection model", id))
    }

    pub(crate) async fn require_task(&self) -> Result<InferenceTask, JobError> {
        self.deps
            .store
            .find_task(self.job_id)
            .await?
            .ok_or_else(|| JobError::not_found("inference task", self.job_id))
    }
}

/// Records every inference pipeline resolves before doing any work.
pub(crate) struct InferenceInputs {
    pub media: Media,
    pub model: DetectionModel,
}

pub(crate) async fn resolve_inference(
    ctx: &JobContext<'_>,
    media_id: DbId,
    model_id: DbId,
) -> Result<InferenceInputs, JobError> {
    ctx.require_task().await?;
    let media = ctx.require_media(media_id).await?;
    let model = ctx.require_model(model_id).await?;
    Ok(InferenceInputs { media, model })
}
