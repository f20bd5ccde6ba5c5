//! Stream message envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pix_models::{Job, JobId, JobKind, JobRequest};

/// What a worker needs to pick up a job. The database row stays the source
/// of truth for status; the message only points at it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueJob {
    pub job_id: JobId,
    pub owner_id: String,
    /// The `{type, payload}` request
    pub request: JobRequest,
    pub enqueued_at: DateTime<Utc>,
}

impl QueueJob {
    pub fn new(job_id: JobId, owner_id: impl Into<String>, request: JobRequest) -> Self {
        Self {
            job_id,
            owner_id: owner_id.into(),
            request,
            enqueued_at: Utc::now(),
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn kind(&self) -> JobKind {
        self.request.kind()
    }

    /// Generate idempotency key for deduplication.
    pub fn idempotency_key(&self) -> String {
        format!("{}:{}", self.owner_id, self.job_id)
    }
}

impl From<&Job> for QueueJob {
    fn from(job: &Job) -> Self {
        Self::new(job.id.clone(), job.owner_id.clone(), job.request.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pix_models::{MediaId, VideoMetadataRequest};

    fn request() -> JobRequest {
        JobRequest::VideoMetadata(VideoMetadataRequest {
            media_id: MediaId::from_string("media-0001"),
        })
    }

    #[test]
    fn test_idempotency_key() {
        let job = QueueJob::new(JobId::from_string("job-0001"), "user-1", request());
        assert_eq!(job.idempotency_key(), "user-1:job-0001");
        assert_eq!(job.kind(), JobKind::VideoMetadata);
    }

    #[test]
    fn test_from_job_keeps_ids() {
        let job = Job::new("user-2", request());
        let queued = QueueJob::from(&job);
        assert_eq!(queued.job_id, job.id);
        assert_eq!(queued.owner_id, "user-2");
        assert_eq!(queued.request, job.request);
    }

    #[test]
    fn test_envelope_carries_type_and_payload() {
        let job = QueueJob::new(JobId::from_string("job-0001"), "user-1", request());
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["request"]["type"], "video_metadata");
        assert_eq!(value["request"]["payload"]["media_id"], "media-0001");

        let parsed: QueueJob = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, job);
    }
}
