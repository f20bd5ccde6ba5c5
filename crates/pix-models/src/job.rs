//! Job definitions and lifecycle.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{JobId, JobRequest, JobResult};

/// Job status as persisted in the database.
///
/// Lifecycle: `pending -> processing -> completed | failed`. A processing job
/// may go back to `pending` when a retryable failure is requeued, and a failed
/// job may be resubmitted by its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is waiting in queue
    #[default]
    Pending,
    /// Job is being processed by a worker
    Processing,
    /// Job completed successfully
    Completed,
    /// Job failed permanently
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether moving from `self` to `next` is a legal lifecycle step.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Pending)
                | (Failed, Pending)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// Type of job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    SmartCrop,
    Resize,
    Zip,
    Transcode,
    VideoMetadata,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::SmartCrop => "smart_crop",
            JobKind::Resize => "resize",
            JobKind::Zip => "zip",
            JobKind::Transcode => "transcode",
            JobKind::VideoMetadata => "video_metadata",
        }
    }

    /// Whether the job shells out to ffmpeg.
    pub fn uses_ffmpeg(&self) -> bool {
        matches!(self, JobKind::Transcode | JobKind::VideoMetadata)
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "smart_crop" => Ok(JobKind::SmartCrop),
            "resize" => Ok(JobKind::Resize),
            "zip" => Ok(JobKind::Zip),
            "transcode" => Ok(JobKind::Transcode),
            "video_metadata" => Ok(JobKind::VideoMetadata),
            other => Err(format!("unknown job kind: {other}")),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

/// A transformation job and its outcome.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    pub id: JobId,
    pub owner_id: String,
    pub kind: JobKind,
    /// The submitted `{type, payload}` request
    pub request: JobRequest,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Number of times a worker picked the job up
    #[serde(default)]
    pub attempts: u32,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Progress (0-100)
    #[serde(default)]
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new pending job.
    pub fn new(owner_id: impl Into<String>, request: JobRequest) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            owner_id: owner_id.into(),
            kind: request.kind(),
            request,
            status: JobStatus::Pending,
            result: None,
            error: None,
            attempts: 0,
            max_attempts: default_max_attempts(),
            progress: 0,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Start processing the job.
    pub fn start(mut self) -> Self {
        self.status = JobStatus::Processing;
        self.attempts += 1;
        self.started_at = Some(Utc::now());
        self.updated_at = Utc::now();
        self
    }

    /// Mark job as completed with its result.
    pub fn complete(mut self, result: JobResult) -> Self {
        self.status = JobStatus::Completed;
        self.result = Some(result);
        self.error = None;
        self.progress = 100;
        self.completed_at = Some(Utc::now());
        self.updated_at = Utc::now();
        self
    }

    /// Mark job as failed.
    pub fn fail(mut self, error: impl Into<String>) -> Self {
        self.status = JobStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
        self.updated_at = Utc::now();
        self
    }

    /// Put the job back in the queue after a retryable failure.
    pub fn requeue(mut self, error: impl Into<String>) -> Self {
        self.status = JobStatus::Pending;
        self.error = Some(error.into());
        self.progress = 0;
        self.updated_at = Utc::now();
        self
    }

    /// Check if another attempt is allowed.
    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }

    /// Update progress.
    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = progress.min(100);
        self.updated_at = Utc::now();
        self
    }
}
