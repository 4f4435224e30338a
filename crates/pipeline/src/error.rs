//! Job failures and their classification.
//!
//! Every pipeline step returns [`JobError`]. The dispatcher turns a failure
//! into a [`ClassifiedError`] before it reaches the failure hook.

use std::fmt;

use mediaq_core::error::CoreError;
use mediaq_core::ffmpeg::FfmpegError;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("{tool} failed (exit code {exit_code:?}): {message}")]
    ExternalTool {
        tool: &'static str,
        exit_code: Option<i32>,
        message: String,
    },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("job cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl JobError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Failure of an external tool that never produced an exit status.
    pub fn tool(tool: &'static str, message: impl Into<String>) -> Self {
        Self::ExternalTool {
            tool,
            exit_code: None,
            message: message.into(),
        }
    }

    /// Attribute an ffmpeg-family failure to `tool`.
    pub fn from_ffmpeg(tool: &'static str, err: FfmpegError) -> Self {
        match err {
            FfmpegError::ExecutionFailed { exit_code, stderr } => Self::ExternalTool {
                tool,
                exit_code,
                message: stderr,
            },
            FfmpegError::MediaNotFound(path) => Self::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("media file not found: {path}"),
            )),
            other => Self::tool(tool, other.to_string()),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::ExternalTool { .. } => ErrorKind::ExternalTool,
            Self::Storage(_) => ErrorKind::Storage,
            Self::InvalidParams(_) => ErrorKind::InvalidParams,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Io(_) => ErrorKind::Io,
        }
    }
}

impl From<sqlx::Error> for JobError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<CoreError> for JobError {
    fn from(err: CoreError) -> Self {
        Self::InvalidParams(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Stable failure categories persisted in the `error_kind` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    ExternalTool,
    Storage,
    InvalidParams,
    Cancelled,
    Io,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::ExternalTool => "external_tool",
            Self::Storage => "storage",
            Self::InvalidParams => "invalid_params",
            Self::Cancelled => "cancelled",
            Self::Io => "io",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured failure record written by the failure hook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Normalize any pipeline failure into `{kind, message}`.
pub fn classify(err: &JobError) -> ClassifiedError {
    ClassifiedError {
        kind: err.kind(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_variants() {
        let cases = [
            (JobError::not_found("media", 9), "not_found"),
            (JobError::tool("ffmpeg", "boom"), "external_tool"),
            (JobError::Storage("down".into()), "storage"),
            (JobError::InvalidParams("bad".into()), "invalid_params"),
            (JobError::Cancelled, "cancelled"),
            (JobError::Io(std::io::Error::other("disk")), "io"),
        ];
        for (err, kind) in cases {
            assert_eq!(classify(&err).kind.as_str(), kind);
        }
    }

    #[test]
    fn message_names_the_missing_entity() {
        let classified = classify(&JobError::not_found("detection model", 12));
        assert_eq!(classified.message, "detection model 12 not found");
    }

    #[test]
    fn ffmpeg_exit_status_is_kept() {
        let err = JobError::from_ffmpeg(
            "ffmpeg",
            FfmpegError::ExecutionFailed {
                exit_code: Some(1),
                stderr: "Invalid data found".into(),
            },
        );
        assert!(matches!(
            err,
            JobError::ExternalTool { tool: "ffmpeg", exit_code: Some(1), .. }
        ));
    }

    #[test]
    fn missing_probe_input_is_io() {
        let err = JobError::from_ffmpeg("ffprobe", FfmpegError::MediaNotFound("/tmp/x".into()));
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn validation_errors_become_invalid_params() {
        let err: JobError = CoreError::Validation("confidence".into()).into();
        assert_eq!(err.kind(), ErrorKind::InvalidParams);
    }
}
