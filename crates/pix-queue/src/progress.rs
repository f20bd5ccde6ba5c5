//! Progress events via Redis Pub/Sub.

use std::pin::Pin;

use futures_util::{Stream, StreamExt};
use redis::AsyncCommands;
use tracing::debug;

use pix_models::{JobEvent, JobId, JobResult};

use crate::error::QueueResult;

/// Channel for publishing/subscribing to job events.
#[derive(Clone)]
pub struct ProgressChannel {
    client: redis::Client,
    prefix: String,
}

impl ProgressChannel {
    /// Create a new progress channel.
    pub fn new(redis_url: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            prefix: "pixvault:progress".to_string(),
        })
    }

    /// Get the channel name for a job.
    pub fn channel_name(&self, job_id: &JobId) -> String {
        format!("{}:{}", self.prefix, job_id)
    }

    /// Publish an event on the job's channel.
    pub async fn publish(&self, event: &JobEvent) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let channel = self.channel_name(event.job_id());
        let payload = serde_json::to_string(event)?;

        debug!("Publishing job event to {}", channel);
        conn.publish::<_, _, ()>(channel, payload).await?;

        Ok(())
    }

    /// Publish a log message.
    pub async fn log(&self, job_id: &JobId, message: impl Into<String>) -> QueueResult<()> {
        self.publish(&JobEvent::log(job_id, message)).await
    }

    /// Publish a progress update.
    pub async fn progress(&self, job_id: &JobId, value: u8) -> QueueResult<()> {
        self.publish(&JobEvent::progress(job_id, value)).await
    }

    pub async fn completed(&self, job_id: &JobId, result: JobResult) -> QueueResult<()> {
        self.publish(&JobEvent::completed(job_id, result)).await
    }

    pub async fn failed(
        &self,
        job_id: &JobId,
        error: impl Into<String>,
        will_retry: bool,
    ) -> QueueResult<()> {
        self.publish(&JobEvent::failed(job_id, error, will_retry))
            .await
    }

    /// Subscribe to events for a job.
    /// Returns a pinned stream that can be polled with `.next()`.
    pub async fn subscribe(
        &self,
        job_id: &JobId,
    ) -> QueueResult<Pin<Box<dyn Stream<Item = JobEvent> + Send>>> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        let channel = self.channel_name(job_id);

        pubsub.subscribe(&channel).await?;

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let payload: String = msg.get_payload().ok()?;
            serde_json::from_str(&payload).ok()
        });

        Ok(Box::pin(stream))
    }
}
