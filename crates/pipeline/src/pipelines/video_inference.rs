//! `run_video_inference`: annotate every frame of a video.
//!
//! Frames are pulled one at a time from the detector, resized to the target
//! size and piped into a raw writer. Progress is frame-based and the
//! cancellation token is polled once per frame. The raw output is re-encoded
//! to H.264 before upload.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::RgbImage;
use mediaq_core::ffmpeg::TranscodeProfile;
use mediaq_core::job::{InferenceParams, JobKind};
use mediaq_core::naming;
use mediaq_core::progress::PROGRESS_COMPLETE;
use mediaq_db::models::job_record::UpdateJobRecord;

use super::{resolve_inference, JobContext, PipelineOutput};
use crate::detector::DetectionRequest;
use crate::error::JobError;
use crate::tools::NoProgress;

pub async fn run(ctx: &JobContext<'_>, params: &InferenceParams) -> Result<PipelineOutput, JobError> {
    let inputs = resolve_inference(ctx, params.media_id, params.model_id).await?;

    let ext = naming::file_extension(&inputs.media.blob_key);
    let source = ctx
        .stager
        .download(&inputs.media.blob_key, &naming::source_temp_name(ctx.job_id, &ext))
        .await?;

    let metadata = ctx.deps.prober.probe(source.path()).await?;
    let total_frames = u64::try_from(metadata.total_frames).unwrap_or(0);
    let (width, height) = (params.target_size.width, params.target_size.height);

    let raw = ctx
        .stager
        .temp_file(&naming::raw_video_temp_name(ctx.job_id))
        .await?;
    let mut writer = ctx
        .deps
        .transcoder
        .open_frame_writer(raw.path(), metadata.frame_rate, width, height)
        .await?;
    let mut frames = ctx
        .deps
        .detector
        .predict_video(DetectionRequest {
            model_path: Path::new(&inputs.model.artifact_path),
            source: source.path(),
            params,
        })
        .await?;

    tracing::info!(
        job_id = %ctx.job_id,
        media_id = inputs.media.id,
        model = %inputs.model.name,
        total_frames,
        fps = metadata.frame_rate,
        "Running video inference",
    );

    let mut counter: u64 = 0;
    while let Some(frame) = frames.next_frame().await? {
        counter += 1;
        let percent = mediaq_core::progress::percent_from_frames(counter, total_frames);
        writer.write_frame(&fit(frame, width, height)).await?;
        ctx.progress.report(percent).await;

        if ctx.cancel.is_cancelled() {
            tracing::info!(job_id = %ctx.job_id, frames = counter, "Cancellation observed, stopping");
            drop(frames);
            if let Err(e) = writer.finish().await {
                tracing::warn!(
                    job_id = %ctx.job_id,
                    error = %e,
                    "Frame writer did not close cleanly after cancel",
                );
            }
            return Err(JobError::Cancelled);
        }
    }
    drop(frames);
    writer.finish().await?;

    let result = ctx
        .stager
        .temp_file(&naming::result_temp_name(ctx.job_id, ".mp4"))
        .await?;
    ctx.deps
        .transcoder
        .transcode(raw.path(), result.path(), &TranscodeProfile::annotated_mp4(), &NoProgress)
        .await?;

    let key = naming::video_result_key(ctx.job_id);
    ctx.stager.upload(&result, &key).await?;

    let patch = UpdateJobRecord {
        progress: Some(i16::from(PROGRESS_COMPLETE)),
        result_key: Some(key.clone()),
        ..Default::default()
    };
    ctx.deps
        .store
        .update_job_record(JobKind::RunVideoInference, ctx.job_id, &patch)
        .await?;

    Ok(PipelineOutput::new(
        key.clone(),
        serde_json::json!({ "status": "success", "resultKey": key, "frames": counter }),
    ))
}

/// Resize `frame` to exactly `width`x`height` unless it already is.
fn fit(frame: RgbImage, width: u32, height: u32) -> RgbImage {
    if frame.dimensions() == (width, height) {
        frame
    } else {
        imageops::resize(&frame, width, height, FilterType::Triangle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_keeps_matching_frames() {
        let frame = RgbImage::new(64, 36);
        assert_eq!(fit(frame, 64, 36).dimensions(), (64, 36));
    }

    #[test]
    fn fit_resizes_to_target() {
        let frame = RgbImage::new(100, 50);
        assert_eq!(fit(frame, 32, 18).dimensions(), (32, 18));
    }
}
