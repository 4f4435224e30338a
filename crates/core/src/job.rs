//! Job kinds and their submission parameters.
//!
//! Parameters travel through the queue as JSON (`camelCase` keys) and are
//! validated once on enqueue and again when a worker decodes them.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;
use crate::types::{DbId, JobId};

/// Default detection confidence threshold.
pub const DEFAULT_CONFIDENCE: f32 = 0.25;

/// Default detection target size as `(height, width)`.
pub const DEFAULT_TARGET_SIZE: (u32, u32) = (1088, 1920);

// ---------------------------------------------------------------------------
// JobKind
// ---------------------------------------------------------------------------

/// The three kinds of work a worker knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    ConvertVideo,
    RunImageInference,
    RunVideoInference,
}

impl JobKind {
    pub const ALL: [JobKind; 3] = [
        JobKind::ConvertVideo,
        JobKind::RunImageInference,
        JobKind::RunVideoInference,
    ];

    /// Queue-facing name, also stored in the `kind` columns.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConvertVideo => "convert_video",
            Self::RunImageInference => "run_image_inference",
            Self::RunVideoInference => "run_video_inference",
        }
    }

    /// Parse from the queue-facing name.
    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == name)
            .ok_or_else(|| CoreError::Validation(format!("Unknown job kind '{name}'")))
    }

    /// Inference jobs own an `inference_tasks` row; conversions own the media row.
    pub fn is_inference(self) -> bool {
        !matches!(self, Self::ConvertVideo)
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Parameters for `convert_video`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertVideoParams {
    pub media_id: DbId,
}

/// Detection input size. Serialized as a `(height, width)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(from = "(u32, u32)", into = "(u32, u32)")]
pub struct TargetSize {
    #[validate(range(min = 1, max = 8192))]
    pub height: u32,
    #[validate(range(min = 1, max = 8192))]
    pub width: u32,
}

impl TargetSize {
    pub fn new(height: u32, width: u32) -> Self {
        Self { height, width }
    }
}

impl Default for TargetSize {
    fn default() -> Self {
        let (height, width) = DEFAULT_TARGET_SIZE;
        Self { height, width }
    }
}

impl From<(u32, u32)> for TargetSize {
    fn from((height, width): (u32, u32)) -> Self {
        Self { height, width }
    }
}

impl From<TargetSize> for (u32, u32) {
    fn from(size: TargetSize) -> Self {
        (size.height, size.width)
    }
}

fn default_confidence() -> f32 {
    DEFAULT_CONFIDENCE
}

/// Parameters shared by `run_image_inference` and `run_video_inference`.
///
/// An empty `class_indices` set means "detect every class".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct InferenceParams {
    pub media_id: DbId,
    pub model_id: DbId,
    #[serde(default)]
    pub class_indices: BTreeSet<u32>,
    #[serde(default = "default_confidence")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub confidence: f32,
    #[serde(default)]
    #[validate(nested)]
    pub target_size: TargetSize,
    #[serde(default)]
    pub augment: bool,
}

impl InferenceParams {
    /// Parameters with every optional field at its default.
    pub fn new(media_id: DbId, model_id: DbId) -> Self {
        Self {
            media_id,
            model_id,
            class_indices: BTreeSet::new(),
            confidence: DEFAULT_CONFIDENCE,
            target_size: TargetSize::default(),
            augment: false,
        }
    }
}

/// Kind-tagged parameters of one job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobParams {
    ConvertVideo(ConvertVideoParams),
    RunImageInference(InferenceParams),
    RunVideoInference(InferenceParams),
}

impl JobParams {
    pub fn kind(&self) -> JobKind {
        match self {
            Self::ConvertVideo(_) => JobKind::ConvertVideo,
            Self::RunImageInference(_) => JobKind::RunImageInference,
            Self::RunVideoInference(_) => JobKind::RunVideoInference,
        }
    }

    /// The source media every kind operates on.
    pub fn media_id(&self) -> DbId {
        match self {
            Self::ConvertVideo(p) => p.media_id,
            Self::RunImageInference(p) | Self::RunVideoInference(p) => p.media_id,
        }
    }

    /// Decode and validate the JSON parameters stored for `kind`.
    pub fn from_json(kind: JobKind, value: &serde_json::Value) -> Result<Self, CoreError> {
        let params = match kind {
            JobKind::ConvertVideo => Self::ConvertVideo(serde_json::from_value(value.clone())?),
            JobKind::RunImageInference => {
                Self::RunImageInference(serde_json::from_value(value.clone())?)
            }
            JobKind::RunVideoInference => {
                Self::RunVideoInference(serde_json::from_value(value.clone())?)
            }
        };
        params.validate()?;
        Ok(params)
    }

    pub fn to_json(&self) -> serde_json::Value {
        let value = match self {
            Self::ConvertVideo(p) => serde_json::to_value(p),
            Self::RunImageInference(p) | Self::RunVideoInference(p) => serde_json::to_value(p),
        };
        // Plain structs of integers, floats and bools always serialize.
        value.unwrap_or(serde_json::Value::Null)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        match self {
            Self::ConvertVideo(_) => Ok(()),
            Self::RunImageInference(p) | Self::RunVideoInference(p) => p
                .validate()
                .map_err(|e| CoreError::Validation(e.to_string())),
        }
    }
}

/// One unit of work as delivered by the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    pub id: JobId,
    pub params: JobParams,
}

impl JobRequest {
    pub fn new(id: JobId, params: JobParams) -> Self {
        Self { id, params }
    }

    pub fn kind(&self) -> JobKind {
        self.params.kind()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
