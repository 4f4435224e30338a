//! Job record columns shared by `media` and `inference_tasks`.

use serde::Deserialize;
use mediaq_core::types::Timestamp;

use super::status::StatusId;

/// Partial update of an owning row's job record columns.
///
/// `None` leaves the column untouched; repositories merge with `COALESCE`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct UpdateJobRecord {
    pub status_id: Option<StatusId>,
    pub progress: Option<i16>,
    pub start_time: Option<Timestamp>,
    pub end_time: Option<Timestamp>,
    pub result: Option<serde_json::Value>,
    pub result_key: Option<String>,
    pub error_message: Option<String>,
    pub error_kind: Option<String>,
}

impl UpdateJobRecord {
    /// Patch carrying only a progress value.
    pub fn progress(value: i16) -> Self {
        Self {
            progress: Some(value),
            ..Self::default()
        }
    }

    /// True when every field is `None`.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// `SET` clause merging an [`UpdateJobRecord`] bound at `$2..=$9`.
pub(crate) const JOB_RECORD_MERGE: &str = "\
    status_id = COALESCE($2, status_id), \
    progress = COALESCE($3, progress), \
    start_time = COALESCE($4, start_time), \
    end_time = COALESCE($5, end_time), \
    result = COALESCE($6, result), \
    result_key = COALESCE($7, result_key), \
    error_message = COALESCE($8, error_message), \
    error_kind = COALESCE($9, error_kind)";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_patch_is_empty() {
        assert!(UpdateJobRecord::default().is_empty());
        assert!(!UpdateJobRecord::progress(3).is_empty());
    }
}
