//! Shared state handed to every job.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, warn};

use pix_db::{Database, DatabaseConfig, JobRepository};
use pix_models::JobId;
use pix_queue::ProgressChannel;
use pix_storage::{DynStore, StorageConfig};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};

/// Connections and limits shared by all jobs on this worker.
pub struct WorkerContext {
    pub config: WorkerConfig,
    pub db: Database,
    pub store: DynStore,
    pub progress: ProgressChannel,
    /// Bounds concurrent FFmpeg processes across jobs
    pub ffmpeg_semaphore: Arc<Semaphore>,
}

impl WorkerContext {
    pub fn new(
        config: WorkerConfig,
        db: Database,
        store: DynStore,
        progress: ProgressChannel,
    ) -> Self {
        let ffmpeg_semaphore = Arc::new(Semaphore::new(config.max_ffmpeg_processes));
        Self {
            config,
            db,
            store,
            progress,
            ffmpeg_semaphore,
        }
    }

    /// Connect to Postgres, object storage and Redis from the environment.
    pub async fn from_env(config: WorkerConfig) -> WorkerResult<Self> {
        let db_config = DatabaseConfig::from_env()?;
        let db = Database::connect(&db_config).await?;

        let store = StorageConfig::from_env()?.connect().await?;

        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let progress = ProgressChannel::new(&redis_url)?;

        tokio::fs::create_dir_all(&config.work_dir)
            .await
            .map_err(|e| WorkerError::config_error(format!("work dir {}: {}", config.work_dir, e)))?;

        Ok(Self::new(config, db, store, progress))
    }

    pub fn job_progress(&self, job_id: &JobId) -> JobProgress {
        JobProgress {
            job_id: job_id.clone(),
            jobs: self.db.jobs(),
            channel: self.progress.clone(),
            last: Arc::new(AtomicU8::new(0)),
        }
    }
}

/// Records a running job's progress in the database and on its event channel.
///
/// Progress only moves forward; lower values are dropped.
#[derive(Clone)]
pub struct JobProgress {
    job_id: JobId,
    jobs: JobRepository,
    channel: ProgressChannel,
    last: Arc<AtomicU8>,
}

impl JobProgress {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub async fn report(&self, value: u8) {
        let value = value.min(100);
        if self.last.fetch_max(value, Ordering::SeqCst) >= value {
            return;
        }

        if let Err(e) = self.jobs.update_progress(&self.job_id, value).await {
            warn!(job_id = %self.job_id, "Failed to record progress: {}", e);
        }
        if let Err(e) = self.channel.progress(&self.job_id, value).await {
            debug!(job_id = %self.job_id, "Failed to publish progress: {}", e);
        }
    }

    pub async fn log(&self, message: impl Into<String>) {
        if let Err(e) = self.channel.log(&self.job_id, message).await {
            debug!(job_id = %self.job_id, "Failed to publish log: {}", e);
        }
    }

    /// A sender for synchronous callbacks (FFmpeg progress). Values are
    /// reported in order by a background task that ends when every sender is
    /// dropped.
    pub fn sender(&self) -> mpsc::UnboundedSender<u8> {
        let (tx, mut rx) = mpsc::unbounded_channel::<u8>();
        let this = self.clone();
        tokio::spawn(async move {
            while let Some(value) = rx.recv().await {
                this.report(value).await;
            }
        });
        tx
    }
}

/// Map a sub-task fraction onto a slice of the overall progress bar.
pub fn scale_progress(start: u8, end: u8, done: usize, total: usize) -> u8 {
    if total == 0 || end <= start {
        return end.max(start);
    }
    let span = (end - start) as usize;
    start + (span * done.min(total) / total) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_progress() {
        assert_eq!(scale_progress(10, 90, 0, 4), 10);
        assert_eq!(scale_progress(10, 90, 2, 4), 50);
        assert_eq!(scale_progress(10, 90, 4, 4), 90);
        assert_eq!(scale_progress(10, 90, 9, 4), 90);
        assert_eq!(scale_progress(10, 90, 0, 0), 90);
    }
}
