//! Redis Streams job queue.
//!
//! This crate provides:
//! - Job enqueueing via Redis Streams with idempotency keys
//! - Worker consumption with redelivery and DLQ
//! - Job events via Redis Pub/Sub

pub mod error;
pub mod job;
pub mod progress;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use job::QueueJob;
pub use progress::ProgressChannel;
pub use queue::{JobQueue, QueueConfig};
