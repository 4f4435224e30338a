//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods
//! that accept `&PgPool` as the first argument.

pub mod detection_model_repo;
pub mod inference_task_repo;
pub mod job_queue_repo;
pub mod media_repo;

pub use detection_model_repo::DetectionModelRepo;
pub use inference_task_repo::InferenceTaskRepo;
pub use job_queue_repo::JobQueueRepo;
pub use media_repo::MediaRepo;

use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::Postgres;

use crate::models::job_record::UpdateJobRecord;

/// Bind an [`UpdateJobRecord`] at `$2..=$9`, matching `JOB_RECORD_MERGE`.
fn bind_job_record<'q>(
    query: Query<'q, Postgres, PgArguments>,
    patch: &'q UpdateJobRecord,
) -> Query<'q, Postgres, PgArguments> {
    query
        .bind(patch.status_id)
        .bind(patch.progress)
        .bind(patch.start_time)
        .bind(patch.end_time)
        .bind(&patch.result)
        .bind(&patch.result_key)
        .bind(&patch.error_message)
        .bind(&patch.error_kind)
}
