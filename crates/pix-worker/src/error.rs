//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// The request cannot succeed no matter how often it is retried.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Processing failed: {0}")]
    ProcessingFailed(String),

    #[error("Job timed out after {0} seconds")]
    Timeout(u64),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    Storage(#[from] pix_storage::StorageError),

    #[error("Database error: {0}")]
    Db(#[from] pix_db::DbError),

    #[error("Media error: {0}")]
    Media(#[from] pix_media::MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] pix_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn processing_failed(msg: impl Into<String>) -> Self {
        Self::ProcessingFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Timeout(_) | WorkerError::Io(_) | WorkerError::Queue(_) => true,
            WorkerError::Storage(e) => e.is_transient(),
            WorkerError::Db(e) => e.is_transient(),
            WorkerError::Media(e) => e.is_transient(),
            WorkerError::InvalidInput(_)
            | WorkerError::ProcessingFailed(_)
            | WorkerError::ConfigError(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(WorkerError::Timeout(30).is_retryable());
        assert!(!WorkerError::invalid_input("not an image").is_retryable());
        assert!(!WorkerError::Db(pix_db::DbError::not_found("media")).is_retryable());
        assert!(!WorkerError::Media(pix_media::MediaError::invalid_image("bad")).is_retryable());
        assert!(WorkerError::Media(pix_media::MediaError::Timeout(5)).is_retryable());
        assert!(!WorkerError::Storage(pix_storage::StorageError::not_found("k")).is_retryable());
    }
}
