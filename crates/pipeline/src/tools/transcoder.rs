//! ffmpeg-backed [`Transcoder`].
//!
//! Progress comes from `-progress pipe:1`, a stream of `key=value` lines on
//! stdout. Only the elapsed output time is extracted; everything else in the
//! stream is ignored.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use image::RgbImage;
use mediaq_core::ffmpeg::TranscodeProfile;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;

use super::process::{read_stderr, tail};
use super::{FrameWriter, TranscodeProgress, Transcoder};
use crate::error::JobError;

const TOOL: &str = "ffmpeg";

/// Codec of the intermediate raw-frame video. Re-encoded before upload.
const RAW_FRAME_CODEC: &str = "mpeg4";

#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    ffmpeg: PathBuf,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-hide_banner", "-nostdin", "-y"]).kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(
        &self,
        src: &Path,
        dst: &Path,
        profile: &TranscodeProfile,
        progress: &dyn TranscodeProgress,
    ) -> Result<(), JobError> {
        let mut cmd = self.command();
        cmd.arg("-i")
            .arg(src)
            .args(profile.output_args())
            .args(["-progress", "pipe:1", "-nostats"])
            .arg(dst)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| JobError::tool(TOOL, format!("failed to start: {e}")))?;
        let stderr_task = tokio::spawn(read_stderr(child.stderr.take()));

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                if let Some(elapsed) = parse_progress_time(&line) {
                    progress.on_elapsed(elapsed).await;
                }
            }
        }

        let status = child.wait().await?;
        let stderr = stderr_task.await.unwrap_or_default();
        if !status.success() {
            return Err(JobError::ExternalTool {
                tool: TOOL,
                exit_code: status.code(),
                message: tail(&stderr),
            });
        }

        tracing::debug!(src = %src.display(), dst = %dst.display(), "Transcode finished");
        Ok(())
    }

    async fn open_frame_writer(
        &self,
        dst: &Path,
        fps: f64,
        width: u32,
        height: u32,
    ) -> Result<Box<dyn FrameWriter>, JobError> {
        let fps = if fps > 0.0 { fps } else { 30.0 };
        let mut cmd = self.command();
        cmd.args(["-f", "rawvideo", "-pix_fmt", "rgb24"])
            .args(["-s", &format!("{width}x{height}")])
            .args(["-r", &format!("{fps}")])
            .args(["-i", "pipe:0", "-an", "-c:v", RAW_FRAME_CODEC, "-q:v", "2"])
            .arg(dst)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| JobError::tool(TOOL, format!("failed to start frame writer: {e}")))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| JobError::tool(TOOL, "frame writer stdin unavailable"))?;
        let stderr_task = tokio::spawn(read_stderr(child.stderr.take()));

        Ok(Box::new(FfmpegFrameWriter {
            child,
            stdin: Some(stdin),
            stderr_task: Some(stderr_task),
            width,
            height,
        }))
    }
}

/// Pipes rgb24 frames into an ffmpeg child. Dropping it kills the child.
struct FfmpegFrameWriter {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr_task: Option<JoinHandle<String>>,
    width: u32,
    height: u32,
}

impl FfmpegFrameWriter {
    /// Close stdin and wait for ffmpeg to exit.
    async fn close(&mut self) -> Result<(), JobError> {
        if let Some(mut stdin) = self.stdin.take() {
            let _ = stdin.shutdown().await;
        }
        let status = self.child.wait().await?;
        let stderr = match self.stderr_task.take() {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };
        if !status.success() {
            return Err(JobError::ExternalTool {
                tool: TOOL,
                exit_code: status.code(),
                message: tail(&stderr),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl FrameWriter for FfmpegFrameWriter {
    async fn write_frame(&mut self, frame: &RgbImage) -> Result<(), JobError> {
        if frame.dimensions() != (self.width, self.height) {
            return Err(JobError::tool(
                TOOL,
                format!(
                    "frame is {}x{}, writer expects {}x{}",
                    frame.width(),
                    frame.height(),
                    self.width,
                    self.height
                ),
            ));
        }
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(JobError::tool(TOOL, "frame writer already closed"));
        };
        if stdin.write_all(frame.as_raw()).await.is_err() {
            // Broken pipe: ffmpeg exited, its stderr says why.
            let closed = self.close().await;
            return Err(closed
                .err()
                .unwrap_or_else(|| JobError::tool(TOOL, "frame writer closed its input early")));
        }
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> Result<(), JobError> {
        self.close().await
    }
}

/// Elapsed output time from one `-progress` line, e.g. `out_time=00:01:02.500000`.
///
/// Lines without a time key, or with `N/A`, yield `None`.
fn parse_progress_time(line: &str) -> Option<Duration> {
    let (key, value) = line.trim().split_once('=')?;
    if !key.ends_with("time") {
        return None;
    }
    let mut parts = value.trim().splitn(3, ':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Some(Duration::from_secs(hours * 3600 + minutes * 60) + Duration::from_secs_f64(seconds))
}
