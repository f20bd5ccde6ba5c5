//! Per-job log context.

use tracing::{error, info, info_span, warn, Span};

use pix_models::{Job, JobId, JobKind};

/// Emits job events with the job id, kind and (inside the executor) attempt
/// number attached as fields.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: JobId,
    kind: JobKind,
    attempt: Option<u32>,
}

impl JobLogger {
    pub fn new(job_id: &JobId, kind: JobKind) -> Self {
        Self {
            job_id: job_id.clone(),
            kind,
            attempt: None,
        }
    }

    /// Logger for one executor attempt of `job`.
    pub fn for_attempt(job: &Job) -> Self {
        Self {
            attempt: Some(job.attempts),
            ..Self::new(&job.id, job.kind)
        }
    }

    /// Span to instrument the handler future with.
    pub fn span(&self) -> Span {
        info_span!(
            "job",
            job_id = %self.job_id,
            kind = self.kind.as_str(),
            attempt = self.attempt
        )
    }

    pub fn started(&self, detail: &str) {
        info!(job_id = %self.job_id, kind = self.kind.as_str(), attempt = self.attempt, "Started: {}", detail);
    }

    pub fn progress(&self, detail: &str) {
        info!(job_id = %self.job_id, kind = self.kind.as_str(), "{}", detail);
    }

    pub fn warning(&self, detail: &str) {
        warn!(job_id = %self.job_id, kind = self.kind.as_str(), attempt = self.attempt, "{}", detail);
    }

    pub fn failed(&self, detail: &str) {
        error!(job_id = %self.job_id, kind = self.kind.as_str(), attempt = self.attempt, "Failed: {}", detail);
    }

    pub fn completed(&self, detail: &str) {
        info!(job_id = %self.job_id, kind = self.kind.as_str(), attempt = self.attempt, "Completed: {}", detail);
    }
}
