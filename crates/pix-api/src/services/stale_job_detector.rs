//! Background service that fails jobs stuck in `processing`.
//!
//! A worker that dies mid-job leaves its row in `processing`, and workers
//! will not start a job in that state again. This detector fails such jobs
//! once they have gone untouched for the configured threshold, so the owner
//! sees an error and can retry. The next claim of the stream entry then acks it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{error, info, warn};

use pix_db::{JobRepository, STALE_JOB_ERROR};
use pix_queue::ProgressChannel;

use crate::metrics;

/// Stale job detector service.
pub struct StaleJobDetector {
    jobs: JobRepository,
    progress: Arc<ProgressChannel>,
    threshold: Duration,
    check_interval: Duration,
}

impl StaleJobDetector {
    pub fn new(
        jobs: JobRepository,
        progress: Arc<ProgressChannel>,
        threshold: Duration,
        check_interval: Duration,
    ) -> Self {
        Self {
            jobs,
            progress,
            threshold,
            check_interval,
        }
    }

    /// Run until `shutdown` flips to true.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting stale job detector (threshold: {:?}, interval: {:?})",
            self.threshold, self.check_interval
        );

        let mut ticker = interval(self.check_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.detect_and_fail().await {
                        error!("Stale job detection error: {:#}", e);
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Stale job detector stopping");
                        break;
                    }
                }
            }
        }
    }

    /// One detection pass. Returns the number of jobs failed.
    pub async fn detect_and_fail(&self) -> anyhow::Result<usize> {
        let threshold = chrono::Duration::from_std(self.threshold)?;
        let cutoff = Utc::now() - threshold;
        let failed = self.jobs.fail_stale(cutoff).await?;

        for job_id in &failed {
            warn!(job_id = %job_id, "Failed stale job");
            if let Err(e) = self.progress.failed(job_id, STALE_JOB_ERROR, false).await {
                warn!(job_id = %job_id, "Failed to publish stale job event: {}", e);
            }
        }

        if !failed.is_empty() {
            metrics::record_stale_jobs(failed.len());
        }
        Ok(failed.len())
    }
}
