//! External media tool seams and their ffmpeg/ffprobe adapters.

pub(crate) mod process;
pub mod prober;
pub mod transcoder;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use image::RgbImage;
use mediaq_core::ffmpeg::{MediaMetadata, TranscodeProfile};

use crate::error::JobError;

pub use prober::FfprobeProber;
pub use transcoder::FfmpegTranscoder;

/// Reads container and stream metadata of a local media file.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<MediaMetadata, JobError>;
}

/// Receives elapsed output time while a transcode runs.
#[async_trait]
pub trait TranscodeProgress: Send + Sync {
    async fn on_elapsed(&self, elapsed: Duration);
}

/// Progress sink that discards every update.
pub struct NoProgress;

#[async_trait]
impl TranscodeProgress for NoProgress {
    async fn on_elapsed(&self, _elapsed: Duration) {}
}

/// Streaming sink of raw frames encoded into a video file.
#[async_trait]
pub trait FrameWriter: Send {
    /// Append one frame. Every frame must have the writer's dimensions.
    async fn write_frame(&mut self, frame: &RgbImage) -> Result<(), JobError>;

    /// Flush and close the output file.
    async fn finish(self: Box<Self>) -> Result<(), JobError>;
}

/// Re-encodes media files and writes raw frame streams.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Transcode `src` into `dst` using `profile`, reporting elapsed output
    /// time to `progress`. A nonzero exit is [`JobError::ExternalTool`].
    async fn transcode(
        &self,
        src: &Path,
        dst: &Path,
        profile: &TranscodeProfile,
        progress: &dyn TranscodeProgress,
    ) -> Result<(), JobError>;

    /// Open a writer encoding `width`x`height` frames at `fps` into `dst`.
    async fn open_frame_writer(
        &self,
        dst: &Path,
        fps: f64,
        width: u32,
        height: u32,
    ) -> Result<Box<dyn FrameWriter>, JobError>;
}
