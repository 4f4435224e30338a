/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Queue execution id. The same value is stamped onto the owning record's
/// `job_id` column so lifecycle updates can find it.
pub type JobId = uuid::Uuid;
