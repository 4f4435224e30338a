//! Runs one job end to end.
//!
//! [`JobDispatcher::execute`] drives the lifecycle around the pipeline
//! selected by the job kind and routes the result to the matching hook:
//! success, failure (with a classified error) or revoked.

use std::sync::Arc;

use mediaq_core::job::{JobKind, JobParams, JobRequest};
use mediaq_core::types::JobId;
use mediaq_db::models::status::JobStatus;
use tokio_util::sync::CancellationToken;

use crate::error::{classify, ClassifiedError, JobError};
use crate::lifecycle::{JobLifecycle, LifecycleSync};
use crate::pipelines::{self, Collaborators, JobContext, PipelineOutput};
use crate::progress::ProgressReporter;
use crate::stager::ResourceStager;

/// Terminal result of one execution.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Succeeded { result_key: String },
    Failed(ClassifiedError),
    Revoked,
}

impl JobOutcome {
    pub fn status(&self) -> JobStatus {
        match self {
            Self::Succeeded { .. } => JobStatus::Success,
            Self::Failed(_) => JobStatus::Failure,
            Self::Revoked => JobStatus::Revoked,
        }
    }
}

pub struct JobDispatcher {
    deps: Collaborators,
    stager: ResourceStager,
    lifecycle: LifecycleSync,
}

impl JobDispatcher {
    pub fn new(deps: Collaborators, stager: ResourceStager) -> Self {
        let lifecycle = LifecycleSync::new(Arc::clone(&deps.store));
        Self {
            deps,
            stager,
            lifecycle,
        }
    }

    /// Execute `job`. A token cancelled before the job starts revokes it
    /// without running anything.
    pub async fn execute(&self, job: &JobRequest, cancel: &CancellationToken) -> JobOutcome {
        let kind = job.kind();
        let mut lifecycle = JobLifecycle::new(&self.lifecycle, kind, job.id);

        if cancel.is_cancelled() {
            tracing::info!(job_id = %job.id, %kind, "Job cancelled before start");
            lifecycle.revoke().await;
            return JobOutcome::Revoked;
        }

        lifecycle.start().await;
        tracing::info!(job_id = %job.id, %kind, media_id = job.params.media_id(), "Job started");

        let progress = ProgressReporter::new(Arc::clone(&self.deps.store), kind, job.id);
        let ctx = JobContext {
            job_id: job.id,
            deps: &self.deps,
            stager: &self.stager,
            progress: &progress,
            cancel,
        };

        match run_pipeline(&ctx, &job.params).await {
            Ok(output) => {
                tracing::info!(job_id = %job.id, %kind, result_key = %output.result_key, "Job succeeded");
                lifecycle.succeed(&output).await;
                JobOutcome::Succeeded {
                    result_key: output.result_key,
                }
            }
            Err(JobError::Cancelled) => {
                tracing::info!(job_id = %job.id, %kind, "Job revoked");
                lifecycle.revoke().await;
                JobOutcome::Revoked
            }
            Err(e) => {
                let classified = classify(&e);
                tracing::error!(
                    job_id = %job.id,
                    %kind,
                    error_kind = %classified.kind,
                    error = %e,
                    "Job failed",
                );
                lifecycle.fail(&classified).await;
                JobOutcome::Failed(classified)
            }
        }
    }

    /// Decode queue-encoded parameters and execute.
    ///
    /// Undecodable parameters fail the job without running a pipeline. An
    /// unknown kind has no owning record to update and is only logged.
    pub async fn execute_encoded(
        &self,
        job_id: JobId,
        kind: &str,
        params: &serde_json::Value,
        cancel: &CancellationToken,
    ) -> JobOutcome {
        let kind = match JobKind::from_name(kind) {
            Ok(kind) => kind,
            Err(e) => {
                let classified = classify(&JobError::from(e));
                tracing::error!(%job_id, kind, error = %classified.message, "Rejected job of unknown kind");
                return JobOutcome::Failed(classified);
            }
        };

        match JobParams::from_json(kind, params) {
            Ok(params) => self.execute(&JobRequest::new(job_id, params), cancel).await,
            Err(e) => {
                let classified = classify(&JobError::from(e));
                tracing::error!(%job_id, %kind, error = %classified.message, "Rejected undecodable job");
                let mut lifecycle = JobLifecycle::new(&self.lifecycle, kind, job_id);
                lifecycle.start().await;
                lifecycle.fail(&classified).await;
                JobOutcome::Failed(classified)
            }
        }
    }
}

async fn run_pipeline(ctx: &JobContext<'_>, params: &JobParams) -> Result<PipelineOutput, JobError> {
    match params {
        JobParams::ConvertVideo(p) => pipelines::convert::run(ctx, p).await,
        JobParams::RunImageInference(p) => pipelines::image_inference::run(ctx, p).await,
        JobParams::RunVideoInference(p) => pipelines::video_inference::run(ctx, p).await,
    }
}
