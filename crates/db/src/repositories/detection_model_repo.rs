//! Repository for the `detection_models` table.

use sqlx::PgPool;
use mediaq_core::types::DbId;

use crate::models::detection_model::{CreateDetectionModel, DetectionModel};

const COLUMNS: &str = "id, name, artifact_path, created_at, updated_at";

pub struct DetectionModelRepo;

impl DetectionModelRepo {
    pub async fn create(
        pool: &PgPool,
        input: &CreateDetectionModel,
    ) -> Result<DetectionModel, sqlx::Error> {
        let query = format!(
            "INSERT INTO detection_models (name, artifact_path) \
             VALUES ($1, $2) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, DetectionModel>(&query)
            .bind(&input.name)
            .bind(&input.artifact_path)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<DetectionModel>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM detection_models WHERE id = $1");
        sqlx::query_as::<_, DetectionModel>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}
