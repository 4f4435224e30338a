//! Row models and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - A create DTO for inserts where rows are created by this workspace
//! - An update DTO (all `Option` fields) for partial merges

pub mod detection_model;
pub mod inference_task;
pub mod job_record;
pub mod media;
pub mod queued_job;
pub mod status;
