//! Lifecycle transitions of a job and their persistence.
//!
//! [`LifecycleSync`] holds one hook per lifecycle event; each hook applies a
//! partial merge to the row owning the job. [`JobLifecycle`] drives those
//! hooks for one execution and refuses transitions the status machine does
//! not allow.

use std::sync::Arc;

use chrono::Utc;
use mediaq_core::job::JobKind;
use mediaq_core::types::JobId;
use mediaq_db::models::job_record::UpdateJobRecord;
use mediaq_db::models::status::JobStatus;

use crate::error::ClassifiedError;
use crate::pipelines::PipelineOutput;
use crate::store::RecordStore;

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

/// Persists lifecycle events. Store failures are logged, never raised.
#[derive(Clone)]
pub struct LifecycleSync {
    store: Arc<dyn RecordStore>,
}

impl LifecycleSync {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// RUNNING + start time.
    pub async fn on_start(&self, kind: JobKind, job_id: JobId) {
        let patch = UpdateJobRecord {
            status_id: Some(JobStatus::Running.id()),
            start_time: Some(Utc::now()),
            ..Default::default()
        };
        self.apply("start", kind, job_id, &patch).await;
    }

    /// Final status + end time.
    pub async fn on_finish(&self, kind: JobKind, job_id: JobId, status: JobStatus) {
        let patch = UpdateJobRecord {
            status_id: Some(status.id()),
            end_time: Some(Utc::now()),
            ..Default::default()
        };
        self.apply("finish", kind, job_id, &patch).await;
    }

    /// Result payload and result key.
    pub async fn on_success(&self, kind: JobKind, job_id: JobId, output: &PipelineOutput) {
        let patch = UpdateJobRecord {
            result: Some(output.result.clone()),
            result_key: Some(output.result_key.clone()),
            ..Default::default()
        };
        self.apply("success", kind, job_id, &patch).await;
    }

    /// Error message and error kind.
    pub async fn on_failure(&self, kind: JobKind, job_id: JobId, error: &ClassifiedError) {
        let patch = UpdateJobRecord {
            error_message: Some(error.message.clone()),
            error_kind: Some(error.kind.as_str().to_string()),
            ..Default::default()
        };
        self.apply("failure", kind, job_id, &patch).await;
    }

    /// REVOKED + end time.
    pub async fn on_revoked(&self, kind: JobKind, job_id: JobId) {
        let patch = UpdateJobRecord {
            status_id: Some(JobStatus::Revoked.id()),
            end_time: Some(Utc::now()),
            ..Default::default()
        };
        self.apply("revoked", kind, job_id, &patch).await;
    }

    async fn apply(&self, event: &'static str, kind: JobKind, job_id: JobId, patch: &UpdateJobRecord) {
        match self.store.update_job_record(kind, job_id, patch).await {
            Ok(true) => tracing::debug!(%job_id, %kind, event, "Lifecycle event recorded"),
            Ok(false) => tracing::warn!(%job_id, %kind, event, "No record owns job; lifecycle event dropped"),
            Err(e) => tracing::error!(
                %job_id,
                %kind,
                event,
                error = %e,
                "Failed to record lifecycle event",
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Lifecycle of one execution: PENDING -> RUNNING -> terminal, or
/// PENDING -> REVOKED.
pub struct JobLifecycle<'a> {
    sync: &'a LifecycleSync,
    kind: JobKind,
    job_id: JobId,
    status: JobStatus,
}

impl<'a> JobLifecycle<'a> {
    pub fn new(sync: &'a LifecycleSync, kind: JobKind, job_id: JobId) -> Self {
        Self {
            sync,
            kind,
            job_id,
            status: JobStatus::Pending,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub async fn start(&mut self) -> bool {
        if !self.advance(JobStatus::Running) {
            return false;
        }
        self.sync.on_start(self.kind, self.job_id).await;
        true
    }

    pub async fn succeed(&mut self, output: &PipelineOutput) -> bool {
        if !self.advance(JobStatus::Success) {
            return false;
        }
        self.sync.on_success(self.kind, self.job_id, output).await;
        self.sync.on_finish(self.kind, self.job_id, JobStatus::Success).await;
        true
    }

    pub async fn fail(&mut self, error: &ClassifiedError) -> bool {
        if !self.advance(JobStatus::Failure) {
            return false;
        }
        self.sync.on_failure(self.kind, self.job_id, error).await;
        self.sync.on_finish(self.kind, self.job_id, JobStatus::Failure).await;
        true
    }

    pub async fn revoke(&mut self) -> bool {
        if !self.advance(JobStatus::Revoked) {
            return false;
        }
        self.sync.on_revoked(self.kind, self.job_id).await;
        true
    }

    fn advance(&mut self, next: JobStatus) -> bool {
        if !self.status.can_transition_to(next) {
            tracing::warn!(
                job_id = %self.job_id,
                from = %self.status,
                to = %next,
                "Illegal lifecycle transition ignored",
            );
            return false;
        }
        self.status = next;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ClassifiedError, ErrorKind};
    use crate::testing::MemoryRecordStore;

    fn setup() -> (Arc<MemoryRecordStore>, LifecycleSync, JobId) {
        let store = Arc::new(MemoryRecordStore::new());
        let media = store.insert_media("uploads/a.png", "image");
        let model = store.insert_model("/models/m.pt");
        let job_id = uuid::Uuid::new_v4();
        store.insert_task(job_id, JobKind::RunImageInference, media, model);
        let sync = LifecycleSync::new(store.clone());
        (store, sync, job_id)
    }

    #[tokio::test]
    async fn success_path_sets_times_and_result() {
        let (store, sync, job_id) = setup();
        let mut lifecycle = JobLifecycle::new(&sync, JobKind::RunImageInference, job_id);

        assert!(lifecycle.start().await);
        let running = store.task(job_id).unwrap();
        assert_eq!(running.status_id, JobStatus::Running.id());
        assert!(running.start_time.is_some());
        assert!(running.end_time.is_none());

        let output = PipelineOutput::new("results/result_x.png", serde_json::json!({"ok": true}));
        assert!(lifecycle.succeed(&output).await);
        let done = store.task(job_id).unwrap();
        assert_eq!(done.status_id, JobStatus::Success.id());
        assert_eq!(done.result_key.as_deref(), Some("results/result_x.png"));
        assert!(done.end_time.is_some());
        assert!(done.start_time.is_some());
    }

    #[tokio::test]
    async fn failure_stores_kind_and_message() {
        let (store, sync, job_id) = setup();
        let mut lifecycle = JobLifecycle::new(&sync, JobKind::RunImageInference, job_id);
        lifecycle.start().await;

        let error = ClassifiedError {
            kind: ErrorKind::ExternalTool,
            message: "detector exited 2".into(),
        };
        assert!(lifecycle.fail(&error).await);

        let task = store.task(job_id).unwrap();
        assert_eq!(task.status_id, JobStatus::Failure.id());
        assert_eq!(task.error_kind.as_deref(), Some("external_tool"));
        assert_eq!(task.error_message.as_deref(), Some("detector exited 2"));
    }

    #[tokio::test]
    async fn pending_job_can_be_revoked_without_start() {
        let (store, sync, job_id) = setup();
        let mut lifecycle = JobLifecycle::new(&sync, JobKind::RunImageInference, job_id);

        assert!(lifecycle.revoke().await);
        let task = store.task(job_id).unwrap();
        assert_eq!(task.status_id, JobStatus::Revoked.id());
        assert!(task.start_time.is_none());
        assert!(task.end_time.is_some());
    }

    #[tokio::test]
    async fn terminal_state_rejects_further_events() {
        let (store, sync, job_id) = setup();
        let mut lifecycle = JobLifecycle::new(&sync, JobKind::RunImageInference, job_id);
        lifecycle.start().await;
        lifecycle.revoke().await;

        let output = PipelineOutput::new("results/late.png", serde_json::Value::Null);
        assert!(!lifecycle.succeed(&output).await);
        assert!(!lifecycle.start().await);
        assert_eq!(lifecycle.status(), JobStatus::Revoked);
        assert_eq!(store.task(job_id).unwrap().status_id, JobStatus::Revoked.id());
        assert!(store.task(job_id).unwrap().result_key.is_none());
    }

    #[tokio::test]
    async fn pending_job_cannot_succeed() {
        let (_store, sync, job_id) = setup();
        let mut lifecycle = JobLifecycle::new(&sync, JobKind::RunImageInference, job_id);
        let output = PipelineOutput::new("results/x.png", serde_json::Value::Null);
        assert!(!lifecycle.succeed(&output).await);
        assert_eq!(lifecycle.status(), JobStatus::Pending);
    }
}
