//! `convert_video`: normalize any source video to web-playable MP4.

use mediaq_core::ffmpeg::TranscodeProfile;
use mediaq_core::job::ConvertVideoParams;
use mediaq_core::naming;
use mediaq_core::progress::PROGRESS_COMPLETE;
use mediaq_db::models::media::UpdateMediaMetadata;

use super::{JobContext, PipelineOutput};
use crate::error::JobError;

pub async fn run(ctx: &JobContext<'_>, params: &ConvertVideoParams) -> Result<PipelineOutput, JobError> {
    let media = ctx.require_media(params.media_id).await?;
    let store = &ctx.deps.store;

    let ext = naming::file_extension(&media.blob_key);
    let source = ctx
        .stager
        .download(&media.blob_key, &naming::source_temp_name(ctx.job_id, &ext))
        .await?;

    let baseline = ctx.deps.prober.probe(source.path()).await?;
    store
        .update_media_metadata(
            media.id,
            &UpdateMediaMetadata {
                width: Some(baseline.width),
                height: Some(baseline.height),
                duration_secs: Some(baseline.duration_secs),
                video_codec: Some(baseline.video_codec.clone()),
                file_extension: Some(ext.clone()),
                progress: Some(0),
                ..Default::default()
            },
        )
        .await?;
    tracing::info!(
        job_id = %ctx.job_id,
        media_id = media.id,
        duration_secs = baseline.duration_secs,
        codec = %baseline.video_codec,
        "Converting video",
    );

    let profile = TranscodeProfile::web_mp4();
    let converted = ctx
        .stager
        .temp_file(&naming::converted_temp_name(ctx.job_id))
        .await?;
    ctx.deps
        .transcoder
        .transcode(
            source.path(),
            converted.path(),
            &profile,
            &ctx.progress.elapsed_of(baseline.duration_secs),
        )
        .await?;

    let output = ctx.deps.prober.probe(converted.path()).await?;
    let key = naming::converted_key(media.id);
    ctx.stager.upload(&converted, &key).await?;

    store
        .update_media_metadata(
            media.id,
            &UpdateMediaMetadata {
                blob_key: Some(key.clone()),
                width: Some(output.width),
                height: Some(output.height),
                duration_secs: Some(output.duration_secs),
                video_codec: Some(output.video_codec),
                file_extension: Some(profile.extension.to_string()),
                progress: Some(i16::from(PROGRESS_COMPLETE)),
            },
        )
        .await?;

    Ok(PipelineOutput::new(
        key.clone(),
        serde_json::json!({ "status": "success", "convertedFilename": key }),
    ))
}
