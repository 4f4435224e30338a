//! Object-detection seam and the sidecar-process adapter.
//!
//! The sidecar is any executable speaking this contract:
//!
//! ```text
//! <detector> --mode image|video --model <weights> --source <file>
//!            --conf <0..1> --imgsz <height>,<width> [--classes 0,2] [--augment]
//! ```
//!
//! In image mode it writes one encoded annotated image (PNG or JPEG) to
//! stdout. In video mode it streams annotated frames as raw rgb24 at
//! `width`x`height`, back to back, and exits 0 after the last one.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use image::RgbImage;
use mediaq_core::job::InferenceParams;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;

use crate::error::JobError;
use crate::tools::process::{read_stderr, tail};

const TOOL: &str = "detector";

/// Inputs of one detection run.
#[derive(Debug, Clone, Copy)]
pub struct DetectionRequest<'a> {
    /// Trained weights on local disk.
    pub model_path: &'a Path,
    pub source: &'a Path,
    pub params: &'a InferenceParams,
}

/// Lazy, finite sequence of annotated frames.
#[async_trait]
pub trait FrameSource: Send {
    /// Next frame, or `None` once the sequence is exhausted.
    async fn next_frame(&mut self) -> Result<Option<RgbImage>, JobError>;
}

#[async_trait]
pub trait Detector: Send + Sync {
    /// Run detection on an image, returning the annotated image.
    async fn predict_image(&self, request: DetectionRequest<'_>) -> Result<RgbImage, JobError>;

    /// Start detection on a video. Frames are produced as they are pulled.
    async fn predict_video(
        &self,
        request: DetectionRequest<'_>,
    ) -> Result<Box<dyn FrameSource>, JobError>;
}

// ---------------------------------------------------------------------------
// Sidecar adapter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SidecarDetector {
    program: PathBuf,
}

impl SidecarDetector {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, mode: &str, request: &DetectionRequest<'_>) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(["--mode", mode])
            .arg("--model")
            .arg(request.model_path)
            .arg("--source")
            .arg(request.source)
            .args(sidecar_args(request.params))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn spawn(&self, mode: &str, request: &DetectionRequest<'_>) -> Result<Child, JobError> {
        self.command(mode, request)
            .spawn()
            .map_err(|e| JobError::tool(TOOL, format!("failed to start {}: {e}", self.program.display())))
    }
}

/// Flags derived from the inference parameters.
fn sidecar_args(params: &InferenceParams) -> Vec<String> {
    let mut args = vec![
        "--conf".to_string(),
        params.confidence.to_string(),
        "--imgsz".to_string(),
        format!("{},{}", params.target_size.height, params.target_size.width),
    ];
    if !params.class_indices.is_empty() {
        let classes: Vec<String> = params.class_indices.iter().map(u32::to_string).collect();
        args.push("--classes".to_string());
        args.push(classes.join(","));
    }
    if params.augment {
        args.push("--augment".to_string());
    }
    args
}

#[async_trait]
impl Detector for SidecarDetector {
    async fn predict_image(&self, request: DetectionRequest<'_>) -> Result<RgbImage, JobError> {
        let output = self.spawn("image", &request)?.wait_with_output().await?;
        if !output.status.success() {
            return Err(JobError::ExternalTool {
                tool: TOOL,
                exit_code: output.status.code(),
                message: tail(&String::from_utf8_lossy(&output.stderr)),
            });
        }
        let annotated = image::load_from_memory(&output.stdout)
            .map_err(|e| JobError::tool(TOOL, format!("unreadable annotated image: {e}")))?;
        Ok(annotated.to_rgb8())
    }

    async fn predict_video(
        &self,
        request: DetectionRequest<'_>,
    ) -> Result<Box<dyn FrameSource>, JobError> {
        let mut child = self.spawn("video", &request)?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| JobError::tool(TOOL, "stdout unavailable"))?;
        let stderr_task = tokio::spawn(read_stderr(child.stderr.take()));
        let size = request.params.target_size;

        Ok(Box::new(SidecarFrames {
            child,
            stdout,
            stderr_task: Some(stderr_task),
            width: size.width,
            height: size.height,
            done: false,
        }))
    }
}

/// Frames read from a running sidecar. Dropping it kills the sidecar.
struct SidecarFrames {
    child: Child,
    stdout: ChildStdout,
    stderr_task: Option<JoinHandle<String>>,
    width: u32,
    height: u32,
    done: bool,
}

impl SidecarFrames {
    fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    async fn exit(&mut self) -> Result<(), JobError> {
        self.done = true;
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
impl FrameSource for SidecarFrames {
    async fn next_frame(&mut self) -> Result<Option<RgbImage>, JobError> {
        if self.done {
            return Ok(None);
        }

        let mut buf = vec![0u8; self.frame_len()];
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.stdout.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        if filled == 0 {
            self.exit().await?;
            return Ok(None);
        }
        if filled < buf.len() {
            self.exit().await?;
            return Err(JobError::tool(
                TOOL,
                format!("truncated frame: {filled} of {} bytes", buf.len()),
            ));
        }

        RgbImage::from_raw(self.width, self.height, buf)
            .map(Some)
            .ok_or_else(|| JobError::tool(TOOL, "frame buffer size mismatch"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn args_carry_every_parameter() {
        let mut params = InferenceParams::new(1, 2);
        params.class_indices = BTreeSet::from([2, 0]);
        params.confidence = 0.5;
        params.augment = true;

        let args = sidecar_args(&params);
        assert_eq!(
            args,
            vec!["--conf", "0.5", "--imgsz", "1088,1920", "--classes", "0,2", "--augment"]
        );
    }

    #[test]
    fn empty_class_set_means_all_classes() {
        let args = sidecar_args(&InferenceParams::new(1, 2));
        assert!(!args.iter().any(|a| a == "--classes"));
        assert!(!args.iter().any(|a| a == "--augment"));
    }

    #[tokio::test]
    async fn missing_program_is_external_tool_error() {
        let detector = SidecarDetector::new("/nonexistent/mediaq-detect");
        let params = InferenceParams::new(1, 2);
        let request = DetectionRequest {
            model_path: Path::new("/models/m.pt"),
            source: Path::new("/tmp/in.png"),
            params: &params,
        };
        let err = detector.predict_image(request).await.unwrap_err();
        assert!(matches!(err, JobError::ExternalTool { tool: "detector", .. }));
    }
}
