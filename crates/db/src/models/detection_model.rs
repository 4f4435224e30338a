//! Detection model references.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use mediaq_core::types::{DbId, Timestamp};

/// A row from the `detection_models` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DetectionModel {
    pub id: DbId,
    pub name: String,
    /// Filesystem path of the trained weights handed to the detector.
    pub artifact_path: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateDetectionModel {
    pub name: String,
    pub artifact_path: String,
}
