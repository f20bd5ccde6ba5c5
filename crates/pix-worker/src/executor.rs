//! Job executor.

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use pix_models::{Job, JobResult, JobStatus};
use pix_queue::{JobQueue, QueueJob};

use crate::context::{JobProgress, WorkerContext};
use crate::error::{WorkerError, WorkerResult};
use crate::handlers;
use crate::logging::JobLogger;

/// How a finished attempt is settled in the database and the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settlement {
    Completed,
    /// Back to pending under a fresh stream entry.
    Requeue,
    Failed,
}

fn settle(outcome: &WorkerResult<JobResult>, job: &Job) -> Settlement {
    match outcome {
        Ok(_) => Settlement::Completed,
        Err(e) if e.is_retryable() && job.can_retry() => Settlement::Requeue,
        Err(_) => Settlement::Failed,
    }
}

/// What to do with a delivery whose job could not be moved to processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SkippedDelivery {
    /// The job is settled or gone; the entry is spent.
    Ack,
    /// Another delivery owns the job and may still need this entry.
    Leave,
}

fn skipped_delivery(status: Option<JobStatus>) -> SkippedDelivery {
    match status {
        Some(JobStatus::Pending | JobStatus::Processing) => SkippedDelivery::Leave,
        Some(JobStatus::Completed | JobStatus::Failed) | None => SkippedDelivery::Ack,
    }
}

/// Job executor that processes jobs from the queue.
pub struct JobExecutor {
    ctx: Arc<WorkerContext>,
    queue: Arc<JobQueue>,
    job_semaphore: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    pub fn new(ctx: WorkerContext, queue: JobQueue) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(ctx.config.max_concurrent_jobs));
        let (shutdown, _) = watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            ctx: Arc::new(ctx),
            queue: Arc::new(queue),
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    pub fn context(&self) -> &Arc<WorkerContext> {
        &self.ctx
    }

    /// Receiver that flips to `true` when shutdown is requested.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Run until shutdown is signalled, then wait for in-flight jobs.
    pub async fn run(&self) -> WorkerResult<()> {
        let config = &self.ctx.config;
        info!(
            "Starting job executor '{}' with {} max concurrent jobs",
            self.consumer_name, config.max_concurrent_jobs
        );

        self.queue.init().await?;

        let claim_task = self.spawn_claim_task();
        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_jobs() => {
                    if let Err(e) = result {
                        error!("Error consuming jobs: {}", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        claim_task.abort();

        info!("Waiting for in-flight jobs to complete...");
        if tokio::time::timeout(config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!(
                "In-flight jobs still running after {:?}; they will be redelivered",
                config.shutdown_timeout
            );
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Periodically take over entries left unacked by crashed workers or by
    /// a failed requeue.
    fn spawn_claim_task(&self) -> tokio::task::JoinHandle<()> {
        let ctx = Arc::clone(&self.ctx);
        let queue = Arc::clone(&self.queue);
        let semaphore = Arc::clone(&self.job_semaphore);
        let consumer_name = self.consumer_name.clone();
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(ctx.config.claim_interval);
            let min_idle_ms = ctx.config.claim_min_idle.as_millis() as u64;
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        let count = semaphore.available_permits().clamp(1, 5);
                        match queue.claim_pending(&consumer_name, min_idle_ms, count).await {
                            Ok(jobs) if !jobs.is_empty() => {
                                info!("Claimed {} pending jobs", jobs.len());
                                for (message_id, job) in jobs {
                                    let Ok(permit) = semaphore.clone().acquire_owned().await else {
                                        break;
                                    };
                                    let ctx = Arc::clone(&ctx);
                                    let queue = Arc::clone(&queue);
                                    tokio::spawn(async move {
                                        let _permit = permit;
                                        Self::execute_job(ctx, queue, message_id, job).await;
                                    });
                                }
                            }
                            Ok(_) => {}
                            Err(e) => warn!("Failed to claim pending jobs: {}", e),
                        }
                    }
                }
            }
        })
    }

    /// Consume and process jobs from the queue.
    async fn consume_jobs(&self) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let jobs = self
            .queue
            .consume(&self.consumer_name, 1000, available.min(5))
            .await?;

        if jobs.is_empty() {
            return Ok(());
        }

        debug!("Consumed {} jobs from queue", jobs.len());

        for (message_id, job) in jobs {
            let ctx = Arc::clone(&self.ctx);
            let queue = Arc::clone(&self.queue);
            let permit = self
                .job_semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::processing_failed("Semaphore closed"))?;

            tokio::spawn(async move {
                let _permit = permit;
                Self::execute_job(ctx, queue, message_id, job).await;
            });
        }

        Ok(())
    }

    /// Execute a single delivery of a job.
    async fn execute_job(
        ctx: Arc<WorkerContext>,
        queue: Arc<JobQueue>,
        message_id: String,
        queued: QueueJob,
    ) {
        let job_id = queued.job_id().clone();
        let jobs = ctx.db.jobs();

        let job = match jobs.mark_processing(&job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                let status = match jobs.get_by_id(&job_id).await {
                    Ok(job) => job.map(|j| j.status),
                    Err(e) => {
                        Self::handle_delivery_error(&queue, &message_id, &queued, &e.to_string())
                            .await;
                        return;
                    }
                };
                match skipped_delivery(status) {
                    SkippedDelivery::Ack => {
                        debug!(job_id = %job_id, ?status, "Job already settled, dropping delivery");
                        if let Err(e) = queue.ack(&message_id).await {
                            error!("Failed to ack job {}: {}", job_id, e);
                        }
                    }
                    SkippedDelivery::Leave => {
                        debug!(job_id = %job_id, ?status, "Job owned by another delivery, leaving entry");
                    }
                }
                return;
            }
            Err(e) => {
                Self::handle_delivery_error(&queue, &message_id, &queued, &e.to_string()).await;
                return;
            }
        };

        let kind = job.kind;
        let logger = JobLogger::for_attempt(&job);
        logger.started(&format!("attempt {}/{}", job.attempts, job.max_attempts));
        counter!("pixvault_jobs_started_total", "kind" => kind.as_str()).increment(1);

        let progress = ctx.job_progress(&job.id);
        let started = Instant::now();
        let outcome = Self::process_job(&ctx, &job, &progress)
            .instrument(logger.span())
            .await;
        histogram!("pixvault_job_duration_seconds", "kind" => kind.as_str())
            .record(started.elapsed().as_secs_f64());

        let settlement = settle(&outcome, &job);
        match outcome {
            Ok(result) => {
                match jobs.mark_completed(&job.id, &result).await {
                    Ok(Some(_)) => logger.completed(&format!("{:?}", result.output_media_id())),
                    Ok(None) => logger.warning("Job left processing before completion was recorded"),
                    Err(e) => {
                        // Leave the entry unacked so a later delivery can settle it.
                        logger.failed(&format!("could not record completion: {e}"));
                        return;
                    }
                }
                if let Err(e) = ctx.progress.completed(&job.id, result).await {
                    debug!("Failed to publish completion for {}: {}", job.id, e);
                }
                if let Err(e) = queue.ack(&message_id).await {
                    error!("Failed to ack job {}: {}", job.id, e);
                }
                if let Err(e) = queue.clear_dedup(&queued).await {
                    warn!("Failed to clear dedup key for job {}: {}", job.id, e);
                }
            }
            Err(e) => {
                let message = e.to_string();
                let will_retry = settlement == Settlement::Requeue;
                logger.failed(&format!("{message} (will_retry={will_retry})"));

                if will_retry {
                    match jobs.requeue(&job.id, &message).await {
                        Ok(Some(_)) => {
                            if let Err(q_err) = queue.requeue(&message_id, &queued).await {
                                error!("Failed to requeue job {} on the stream: {}", job.id, q_err);
                            }
                        }
                        Ok(None) => {
                            logger.warning("Job left processing before it could be requeued");
                            if let Err(q_err) = queue.ack(&message_id).await {
                                error!("Failed to ack job {}: {}", job.id, q_err);
                            }
                        }
                        Err(db_err) => error!("Failed to requeue job {}: {}", job.id, db_err),
                    }
                } else {
                    if let Err(db_err) = jobs.mark_failed(&job.id, &message).await {
                        error!("Failed to mark job {} failed: {}", job.id, db_err);
                    }
                    if let Err(q_err) = queue.dlq(&message_id, &queued, &message).await {
                        error!("Failed to move job {} to DLQ: {}", job.id, q_err);
                    }
                    if let Err(q_err) = queue.clear_dedup(&queued).await {
                        warn!("Failed to clear dedup key for job {}: {}", job.id, q_err);
                    }
                }

                if let Err(pub_err) = ctx.progress.failed(&job.id, message, will_retry).await {
                    debug!("Failed to publish failure for {}: {}", job.id, pub_err);
                }
            }
        }

        let status = match settlement {
            Settlement::Completed => "completed",
            Settlement::Requeue => "requeued",
            Settlement::Failed => "failed",
        };
        counter!("pixvault_jobs_finished_total", "kind" => kind.as_str(), "status" => status)
            .increment(1);
    }

    /// The job could not even be started. Count the delivery and give up on
    /// the entry once the stream's retry budget is spent.
    async fn handle_delivery_error(
        queue: &JobQueue,
        message_id: &str,
        queued: &QueueJob,
        error: &str,
    ) {
        let job_id = queued.job_id();
        error!("Failed to start job {}: {}", job_id, error);

        let retry_count = queue.increment_retry(message_id).await.unwrap_or(u32::MAX);
        let max_retries = queue.max_retries();
        if retry_count >= max_retries {
            warn!("Job {} exceeded max deliveries ({}), moving to DLQ", job_id, max_retries);
            if let Err(e) = queue.dlq(message_id, queued, error).await {
                error!("Failed to move job {} to DLQ: {}", job_id, e);
            }
            if let Err(e) = queue.clear_dedup(queued).await {
                warn!("Failed to clear dedup key for job {}: {}", job_id, e);
            }
        } else {
            info!(
                "Job {} will be redelivered (attempt {}/{})",
                job_id, retry_count, max_retries
            );
        }
    }

    /// Run the handler under the per-job timeout.
    async fn process_job(
        ctx: &WorkerContext,
        job: &Job,
        progress: &JobProgress,
    ) -> WorkerResult<JobResult> {
        let timeout = ctx.config.job_timeout;
        match tokio::time::timeout(timeout, handlers::dispatch(ctx, job, progress)).await {
            Ok(result) => result,
            Err(_) => Err(WorkerError::Timeout(timeout.as_secs())),
        }
    }

    /// Wait for all in-flight jobs to complete.
    async fn wait_for_jobs(&self) {
        loop {
            let available = self.job_semaphore.available_permits();
            if available == self.ctx.config.max_concurrent_jobs {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pix_models::{JobRequest, MediaId, ResizeResult, VideoMetadataRequest};

    fn job(attempts: u32) -> Job {
        let mut job = Job::new(
            "user-1",
            JobRequest::VideoMetadata(VideoMetadataRequest {
                media_id: MediaId::from_string("media-0001"),
            }),
        );
        job.attempts = attempts;
        job
    }

    #[test]
    fn test_settle_success() {
        let ok = Ok(JobResult::Resize(ResizeResult {
            media_id: MediaId::from_string("media-out1"),
            width: 1,
            height: 1,
        }));
        assert_eq!(settle(&ok, &job(1)), Settlement::Completed);
    }

    #[test]
    fn test_settle_retryable_until_attempts_run_out() {
        let err = || Err(WorkerError::Timeout(10));
        assert_eq!(settle(&err(), &job(1)), Settlement::Requeue);
        assert_eq!(settle(&err(), &job(2)), Settlement::Requeue);
        assert_eq!(settle(&err(), &job(3)), Settlement::Failed);
    }

    #[test]
    fn test_settle_invalid_input_never_retries() {
        let err = Err(WorkerError::invalid_input("media missing"));
        assert_eq!(settle(&err, &job(1)), Settlement::Failed);
    }

    #[test]
    fn test_skipped_delivery_keeps_entry_of_live_job() {
        assert_eq!(skipped_delivery(Some(JobStatus::Processing)), SkippedDelivery::Leave);
        assert_eq!(skipped_delivery(Some(JobStatus::Pending)), SkippedDelivery::Leave);
        assert_eq!(skipped_delivery(Some(JobStatus::Completed)), SkippedDelivery::Ack);
        assert_eq!(skipped_delivery(Some(JobStatus::Failed)), SkippedDelivery::Ack);
        assert_eq!(skipped_delivery(None), SkippedDelivery::Ack);
    }

    mod live {
        use super::*;
        use crate::config::WorkerConfig;
        use pix_db::{Database, DatabaseConfig};
        use pix_models::JobId;
        use pix_queue::{ProgressChannel, QueueConfig};
        use pix_storage::{DynStore, FsStore};

        struct Harness {
            ctx: Arc<WorkerContext>,
            queue: Arc<JobQueue>,
            _dir: tempfile::TempDir,
        }

        async fn harness(job_timeout: Duration) -> Harness {
            dotenvy::dotenv().ok();
            let db = Database::connect(&DatabaseConfig::from_env().expect("DATABASE_URL"))
                .await
                .expect("connect");
            db.migrate().await.expect("migrate");

            let suffix = JobId::new();
            let queue_config = QueueConfig {
                stream_name: format!("pixvault:test:{suffix}:jobs"),
                consumer_group: format!("pixvault:test:{suffix}:workers"),
                dlq_stream_name: format!("pixvault:test:{suffix}:dlq"),
                ..QueueConfig::from_env()
            };
            let progress = ProgressChannel::new(&queue_config.redis_url).unwrap();
            let queue = JobQueue::new(queue_config).unwrap();
            queue.init().await.expect("init queue");

            let dir = tempfile::tempdir().unwrap();
            let store: DynStore = Arc::new(FsStore::new(dir.path()).await.unwrap());
            let config = WorkerConfig {
                job_timeout,
                work_dir: dir.path().to_string_lossy().into_owned(),
                ..WorkerConfig::default()
            };

            Harness {
                ctx: Arc::new(WorkerContext::new(config, db, store, progress)),
                queue: Arc::new(queue),
                _dir: dir,
            }
        }

        async fn pending_job(h: &Harness) -> (Job, QueueJob) {
            let job = job(0);
            h.ctx.db.jobs().insert(&job).await.unwrap();
            let queued = QueueJob::from(&job);
            h.queue.enqueue(&queued).await.unwrap();
            (job, queued)
        }

        #[tokio::test]
        #[ignore = "requires Postgres and Redis"]
        async fn test_redelivery_of_running_job_keeps_entry() {
            let h = harness(Duration::from_secs(60)).await;
            let (job, _) = pending_job(&h).await;

            // The first delivery owns the job.
            h.ctx.db.jobs().mark_processing(&job.id).await.unwrap().unwrap();

            let mut delivered = h.queue.consume("worker-b", 1000, 1).await.unwrap();
            let (message_id, queued) = delivered.remove(0);
            JobExecutor::execute_job(Arc::clone(&h.ctx), Arc::clone(&h.queue), message_id, queued)
                .await;

            assert_eq!(h.queue.len().await.unwrap(), 1);
            let stored = h.ctx.db.jobs().get_by_id(&job.id).await.unwrap().unwrap();
            assert_eq!(stored.status, JobStatus::Processing);
        }

        #[tokio::test]
        #[ignore = "requires Postgres and Redis"]
        async fn test_retryable_failure_requeues_after_entry_was_dropped() {
            let h = harness(Duration::ZERO).await;
            let (job, _) = pending_job(&h).await;

            let mut delivered = h.queue.consume("worker-a", 1000, 1).await.unwrap();
            let (message_id, queued) = delivered.remove(0);
            // Another consumer removed the entry while this delivery was running.
            h.queue.ack(&message_id).await.unwrap();
            assert_eq!(h.queue.len().await.unwrap(), 0);

            JobExecutor::execute_job(
                Arc::clone(&h.ctx),
                Arc::clone(&h.queue),
                message_id.clone(),
                queued.clone(),
            )
            .await;

            let stored = h.ctx.db.jobs().get_by_id(&job.id).await.unwrap().unwrap();
            assert_eq!(stored.status, JobStatus::Pending);
            assert_eq!(stored.attempts, 1);

            let again = h.queue.consume("worker-c", 1000, 1).await.unwrap();
            assert_eq!(again.len(), 1);
            assert_ne!(again[0].0, message_id);
            assert_eq!(again[0].1, queued);

            h.queue.ack(&again[0].0).await.unwrap();
            h.queue.clear_dedup(&queued).await.unwrap();
        }
    }
}
