//! Media rows: the source files jobs operate on.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use mediaq_core::types::{DbId, JobId, Timestamp};

use super::status::StatusId;

/// A row from the `media` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Media {
    pub id: DbId,
    pub blob_key: String,
    pub original_name: Option<String>,
    pub media_type: String,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub duration_secs: Option<f64>,
    pub video_codec: Option<String>,
    pub file_extension: Option<String>,
    pub job_id: Option<JobId>,
    pub status_id: StatusId,
    pub progress: i16,
    pub start_time: Option<Timestamp>,
    pub end_time: Option<Timestamp>,
    pub result: Option<serde_json::Value>,
    pub result_key: Option<String>,
    pub error_message: Option<String>,
    pub error_kind: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for registering an uploaded file.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateMedia {
    pub blob_key: String,
    pub original_name: Option<String>,
    /// `video` or `image`. Defaults to `video`.
    pub media_type: Option<String>,
}

/// Transcoding metadata written by the conversion pipeline.
///
/// `blob_key` is only set when the converted file replaces the source.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct UpdateMediaMetadata {
    pub blob_key: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub duration_secs: Option<f64>,
    pub video_codec: Option<String>,
    pub file_extension: Option<String>,
    pub progress: Option<i16>,
}
