//! Batch pattern learning.
//!
//! The processor drains the learning queue, aggregates candidate patterns
//! per issuer, and promotes the best ones into the durable template store
//! and the caches. The scheduler drives it on an interval and handles
//! housekeeping (queue retention, cache sweeps).

pub mod processor;
pub mod scheduler;

pub use processor::{BatchReport, TrainingProcessor};
pub use scheduler::{SchedulerHandle, TrainingScheduler};
