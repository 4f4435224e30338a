//! Persists job progress as it is produced.
//!
//! Writes are fire-and-forget: a failed write is logged and counted but
//! never fails the job. The reporter never persists a value lower than one
//! it already reported, so the stored sequence is non-decreasing even if a
//! source jitters.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mediaq_core::job::JobKind;
use mediaq_core::progress::{clamp_percent, percent_from_elapsed, percent_from_frames};
use mediaq_core::types::JobId;
use mediaq_db::models::job_record::UpdateJobRecord;

use crate::store::RecordStore;
use crate::tools::TranscodeProgress;

pub struct ProgressReporter {
    store: Arc<dyn RecordStore>,
    kind: JobKind,
    job_id: JobId,
    last: AtomicU8,
    failed_writes: AtomicU64,
}

impl ProgressReporter {
    pub fn new(store: Arc<dyn RecordStore>, kind: JobKind, job_id: JobId) -> Self {
        Self {
            store,
            kind,
            job_id,
            last: AtomicU8::new(0),
            failed_writes: AtomicU64::new(0),
        }
    }

    /// Persist `percent` (clamped, never below the last value). Returns the
    /// value written.
    pub async fn report(&self, percent: u8) -> u8 {
        let percent = percent.min(100);
        let value = self.last.fetch_max(percent, Ordering::AcqRel).max(percent);

        let patch = UpdateJobRecord::progress(i16::from(value));
        match self.store.update_job_record(self.kind, self.job_id, &patch).await {
            Ok(true) => {}
            Ok(false) => {
                self.failed_writes.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(job_id = %self.job_id, kind = %self.kind, "No record owns job; progress dropped");
            }
            Err(e) => {
                self.failed_writes.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    job_id = %self.job_id,
                    kind = %self.kind,
                    progress = value,
                    error = %e,
                    "Failed to persist progress",
                );
            }
        }
        value
    }

    /// Report an arbitrary, possibly out-of-range percentage.
    pub async fn report_raw(&self, percent: f64) -> u8 {
        self.report(clamp_percent(percent)).await
    }

    /// Time-ratio source: `elapsed / total_secs`.
    pub async fn report_elapsed(&self, elapsed: Duration, total_secs: f64) -> u8 {
        self.report(percent_from_elapsed(elapsed, total_secs)).await
    }

    /// Frame-ratio source: `floor(done / total * 100)`.
    pub async fn report_frames(&self, done: u64, total: u64) -> u8 {
        self.report(percent_from_frames(done, total)).await
    }

    pub fn last_reported(&self) -> u8 {
        self.last.load(Ordering::Acquire)
    }

    /// Writes that were dropped.
    pub fn failed_writes(&self) -> u64 {
        self.failed_writes.load(Ordering::Relaxed)
    }

    /// Adapter feeding transcoder elapsed time into this reporter.
    pub fn elapsed_of(&self, total_secs: f64) -> ElapsedProgress<'_> {
        ElapsedProgress {
            reporter: self,
            total_secs,
        }
    }
}

/// [`TranscodeProgress`] sink that converts elapsed output time to a percentage.
pub struct ElapsedProgress<'a> {
    reporter: &'a ProgressReporter,
    total_secs: f64,
}

#[async_trait]
impl TranscodeProgress for ElapsedProgress<'_> {
    async fn on_elapsed(&self, elapsed: Duration) {
        self.reporter.report_elapsed(elapsed, self.total_secs).await;
    }
}
