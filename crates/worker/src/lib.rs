//! Worker process: configuration and the pool that drains the job queue.

pub mod config;
pub mod pool;
