//! Queue rows.

use serde::Serialize;
use sqlx::FromRow;
use mediaq_core::types::{JobId, Timestamp};

use super::status::StatusId;

/// A row from the `job_queue` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct QueuedJob {
    pub id: JobId,
    pub kind: String,
    pub params: serde_json::Value,
    pub status_id: StatusId,
    pub cancel_requested: bool,
    pub worker_name: Option<String>,
    pub submitted_at: Timestamp,
    pub claimed_at: Option<Timestamp>,
    /// Last liveness signal from the claiming worker.
    pub heartbeat_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
}
