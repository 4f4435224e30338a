//! `run_image_inference`: annotate one image with detections.

use std::path::Path;

use mediaq_core::job::{InferenceParams, JobKind};
use mediaq_core::naming;
use mediaq_core::progress::PROGRESS_COMPLETE;
use mediaq_db::models::job_record::UpdateJobRecord;

use super::{resolve_inference, JobContext, PipelineOutput};
use crate::detector::DetectionRequest;
use crate::error::JobError;

pub async fn run(ctx: &JobContext<'_>, params: &InferenceParams) -> Result<PipelineOutput, JobError> {
    let inputs = resolve_inference(ctx, params.media_id, params.model_id).await?;

    let ext = naming::file_extension(&inputs.media.blob_key);
    let source = ctx
        .stager
        .download(&inputs.media.blob_key, &naming::source_temp_name(ctx.job_id, &ext))
        .await?;

    tracing::info!(
        job_id = %ctx.job_id,
        media_id = inputs.media.id,
        model = %inputs.model.name,
        "Running image inference",
    );
    let annotated = ctx
        .deps
        .detector
        .predict_image(DetectionRequest {
            model_path: Path::new(&inputs.model.artifact_path),
            source: source.path(),
            params,
        })
        .await?;

    let out_ext = naming::image_output_extension(&ext);
    let result = ctx
        .stager
        .temp_file(&naming::result_temp_name(ctx.job_id, &out_ext))
        .await?;
    let path = result.path().to_path_buf();
    tokio::task::spawn_blocking(move || annotated.save(&path))
        .await
        .map_err(|e| JobError::Io(std::io::Error::other(e)))?
        .map_err(|e| JobError::Io(std::io::Error::other(e)))?;

    let key = naming::image_result_key(ctx.job_id, &out_ext);
    ctx.stager.upload(&result, &key).await?;

    let patch = UpdateJobRecord {
        progress: Some(i16::from(PROGRESS_COMPLETE)),
        result_key: Some(key.clone()),
        ..Default::default()
    };
    ctx.deps
        .store
        .update_job_record(JobKind::RunImageInference, ctx.job_id, &patch)
        .await?;

    Ok(PipelineOutput::new(
        key.clone(),
        serde_json::json!({ "status": "success", "resultKey": key }),
    ))
}
