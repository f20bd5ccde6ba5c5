//! Job progress events.
//!
//! Published by the worker on a per-job channel while a job runs.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{JobId, JobResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// Progress update (0-100)
    Progress { job_id: JobId, value: u8 },

    Log {
        job_id: JobId,
        message: String,
        timestamp: DateTime<Utc>,
    },

    Completed { job_id: JobId, result: JobResult },

    Failed {
        job_id: JobId,
        error: String,
        /// Whether the job went back to the queue for another attempt
        #[serde(default)]
        will_retry: bool,
        timestamp: DateTime<Utc>,
    },
}

impl JobEvent {
    pub fn progress(job_id: &JobId, value: u8) -> Self {
        JobEvent::Progress {
            job_id: job_id.clone(),
            value: value.min(100),
        }
    }

    pub fn log(job_id: &JobId, message: impl Into<String>) -> Self {
        JobEvent::Log {
            job_id: job_id.clone(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn completed(job_id: &JobId, result: JobResult) -> Self {
        JobEvent::Completed {
            job_id: job_id.clone(),
            result,
        }
    }

    pub fn failed(job_id: &JobId, error: impl Into<String>, will_retry: bool) -> Self {
        JobEvent::Failed {
            job_id: job_id.clone(),
            error: error.into(),
            will_retry,
            timestamp: Utc::now(),
        }
    }

    pub fn job_id(&self) -> &JobId {
        match self {
            JobEvent::Progress { job_id, .. }
            | JobEvent::Log { job_id, .. }
            | JobEvent::Completed { job_id, .. }
            | JobEvent::Failed { job_id, .. } => job_id,
        }
    }

    /// Whether this is the last event a job will emit.
    pub fn is_terminal(&self) -> bool {
        match self {
            JobEvent::Completed { .. } => true,
            JobEvent::Failed { will_retry, .. } => !will_retry,
            _ => false,
        }
    }
}
