//! Inference task rows: the owning record of an inference execution.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use mediaq_core::types::{DbId, JobId, Timestamp};

use super::status::StatusId;

/// A row from the `inference_tasks` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct InferenceTask {
    pub id: DbId,
    pub kind: String,
    pub media_id: DbId,
    pub model_id: DbId,
    pub params: serde_json::Value,
    pub job_id: JobId,
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

/// DTO for inserting the task row of a newly enqueued inference job.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateInferenceTask {
    pub job_id: JobId,
    pub kind: String,
    pub media_id: DbId,
    pub model_id: DbId,
    pub params: serde_json::Value,
}
