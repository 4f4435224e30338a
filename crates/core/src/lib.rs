//! Pure domain layer for the media job engine.
//!
//! No database, blob or subprocess clients live here (ffprobe invocation is
//! the one exception, mirroring how every crate shares a single probe helper).

pub mod error;
pub mod ffmpeg;
pub mod job;
pub mod naming;
pub mod progress;
pub mod types;
