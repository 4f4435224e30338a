//! Media job engine.
//!
//! Drives conversion and detection jobs through their pipelines, persisting
//! progress and lifecycle transitions as they happen. External systems are
//! reached through traits ([`BlobStore`](blob::BlobStore),
//! [`RecordStore`](store::RecordStore), [`Prober`](tools::Prober),
//! [`Transcoder`](tools::Transcoder), [`Detector`](detector::Detector),
//! [`JobQueue`](queue::JobQueue)) so the engine runs unchanged against
//! production adapters or the in-memory doubles of the `testing` feature.

pub mod blob;
pub mod config;
pub mod detector;
pub mod dispatcher;
pub mod error;
pub mod lifecycle;
pub mod pipelines;
pub mod progress;
pub mod queue;
pub mod stager;
pub mod store;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod tools;

pub use dispatcher::{JobDispatcher, JobOutcome};
pub use error::{classify, ClassifiedError, ErrorKind, JobError};
pub use pipelines::{Collaborators, PipelineOutput};
