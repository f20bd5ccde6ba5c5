//! Image and video job worker.
//!
//! This crate provides:
//! - Job executor with retry, requeue and DLQ handling
//! - Handlers for smart crop, resize, zip, transcode and video metadata jobs
//! - Progress reporting to the database and Redis
//! - The publication scheduler
//! - Graceful shutdown

pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod handlers;
pub mod logging;
pub mod retry;
pub mod scheduler;

pub use config::WorkerConfig;
pub use context::{JobProgress, WorkerContext};
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use logging::JobLogger;
pub use scheduler::PublicationScheduler;
