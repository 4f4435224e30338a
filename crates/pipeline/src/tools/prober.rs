use std::path::{Path, PathBuf};

use async_trait::async_trait;
use mediaq_core::ffmpeg::{probe_media, MediaMetadata};

use super::Prober;
use crate::error::JobError;

/// [`Prober`] running `ffprobe -show_format -show_streams`.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    ffprobe: PathBuf,
}

impl FfprobeProber {
    pub fn new(ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffprobe: ffprobe.into(),
        }
    }
}

#[async_trait]
impl Prober for FfprobeProber {
    async fn probe(&self, path: &Path) -> Result<MediaMetadata, JobError> {
        let output = probe_media(&self.ffprobe, path)
            .await
            .map_err(|e| JobError::from_ffmpeg("ffprobe", e))?;
        let metadata =
            MediaMetadata::from_probe(&output, path).map_err(|e| JobError::from_ffmpeg("ffprobe", e))?;
        tracing::debug!(
            path = %path.display(),
            width = metadata.width,
            height = metadata.height,
            duration_secs = metadata.duration_secs,
            codec = %metadata.video_codec,
            "Probed media",
        );
        Ok(metadata)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use assert_matches::assert_matches;

    use super::*;

    /// Write an executable stand-in for ffprobe that prints `json`.
    fn stub_ffprobe(dir: &Path, json: &str) -> PathBuf {
        let script = dir.join("ffprobe");
        std::fs::write(&script, format!("#!/bin/sh\ncat <<'EOF'\n{json}\nEOF\n")).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    #[tokio::test]
    async fn audio_only_output_is_external_tool_error() {
        let dir = tempfile::tempdir().unwrap();
        let ffprobe = stub_ffprobe(
            dir.path(),
            r#"{"streams":[{"index":0,"codec_type":"audio","codec_name":"aac"}],"format":{"duration":"10.0"}}"#,
        );
        let source = dir.path().join("song.m4a");
        std::fs::write(&source, b"audio").unwrap();

        let err = FfprobeProber::new(ffprobe).probe(&source).await.unwrap_err();
        assert_matches!(err, JobError::ExternalTool { tool: "ffprobe", .. });
    }

    #[tokio::test]
    async fn video_output_is_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let ffprobe = stub_ffprobe(
            dir.path(),
            r#"{"streams":[{"index":0,"codec_type":"video","codec_name":"h264","width":1280,"height":720,"r_frame_rate":"25/1"}],"format":{"duration":"4.0"}}"#,
        );
        let source = dir.path().join("clip.mp4");
        std::fs::write(&source, b"video").unwrap();

        let metadata = FfprobeProber::new(ffprobe).probe(&source).await.unwrap();
        assert_eq!((metadata.width, metadata.height), (1280, 720));
        assert_eq!(metadata.video_codec, "h264");
        assert_eq!(metadata.total_frames, 100);
        assert_eq!(metadata.file_extension, ".mp4");
    }
}
