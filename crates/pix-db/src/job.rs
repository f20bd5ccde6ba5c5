//! Job persistence.
//!
//! The database row is the source of truth for a job's status. Every
//! transition is a conditional `UPDATE ... WHERE status = ...`, so concurrent
//! workers and the stale job detector cannot move a job along an edge the
//! lifecycle does not allow.

use chrono::{DateTime, Utc};
use pix_models::{Job, JobId, JobKind, JobRequest, JobResult, JobStatus};
use sqlx::types::Json;
use sqlx::postgres::PgArguments;
use sqlx::query::QueryAs;
use sqlx::{FromRow, PgPool, Postgres};
use tracing::{debug, info, instrument, warn};

use crate::error::{DbError, DbResult};
use crate::media::map_constraint;

const JOB_COLUMNS: &str = "id, owner_id, kind, request, status, result, error, attempts, \
     max_attempts, progress, created_at, updated_at, started_at, completed_at";

/// Error recorded on jobs failed by the stale job detector.
pub const STALE_JOB_ERROR: &str = "Job timed out while processing";

#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    pub id: String,
    pub owner_id: String,
    pub kind: String,
    pub request: serde_json::Value,
    pub status: String,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub attempts: i32,
    pub max_attempts: i32,
    pub progress: i16,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<JobRow> for Job {
    type Error = DbError;

    fn try_from(row: JobRow) -> DbResult<Self> {
        let kind: JobKind = row.kind.parse().map_err(DbError::decode)?;
        let status: JobStatus = row.status.parse().map_err(DbError::decode)?;
        let request: JobRequest = serde_json::from_value(row.request)?;
        let result: Option<JobResult> = row.result.map(serde_json::from_value).transpose()?;

        if request.kind() != kind {
            return Err(DbError::decode(format!(
                "job {} kind {} does not match its request",
                row.id, kind
            )));
        }

        Ok(Job {
            id: JobId::from_string(row.id),
            owner_id: row.owner_id,
            kind,
            request,
            status,
            result,
            error: row.error,
            attempts: u32::try_from(row.attempts).unwrap_or(0),
            max_attempts: u32::try_from(row.max_attempts).unwrap_or(1).max(1),
            progress: u8::try_from(row.progress.clamp(0, 100)).unwrap_or(0),
            created_at: row.created_at,
            updated_at: row.updated_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

type JobQuery<'q> = QueryAs<'q, Postgres, JobRow, PgArguments>;

#[derive(Clone)]
pub struct JobRepository {
    pool: PgPool,
}

impl JobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_job(&self, query: JobQuery<'_>) -> DbResult<Option<Job>> {
        query
            .fetch_optional(&self.pool)
            .await?
            .map(Job::try_from)
            .transpose()
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, kind = %job.kind))]
    pub async fn insert(&self, job: &Job) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, owner_id, kind, request, status, result, error, attempts, max_attempts,
                progress, created_at, updated_at, started_at, completed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(job.id.as_str())
        .bind(&job.owner_id)
        .bind(job.kind.as_str())
        .bind(Json(&job.request))
        .bind(job.status.as_str())
        .bind(job.result.as_ref().map(Json))
        .bind(&job.error)
        .bind(i32::try_from(job.attempts).unwrap_or(i32::MAX))
        .bind(i32::try_from(job.max_attempts).unwrap_or(i32::MAX))
        .bind(i16::from(job.progress))
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_constraint(e, "job"))?;

        debug!("Inserted job");
        Ok(())
    }

    /// Fetch a job owned by `owner_id`.
    #[instrument(skip(self))]
    pub async fn get(&self, owner_id: &str, id: &JobId) -> DbResult<Job> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1 AND owner_id = $2");
        self.fetch_job(sqlx::query_as(&sql).bind(id.as_str()).bind(owner_id))
            .await?
            .ok_or_else(|| DbError::not_found(format!("job {id}")))
    }

    /// Fetch a job regardless of owner. Used by workers.
    #[instrument(skip(self))]
    pub async fn get_by_id(&self, id: &JobId) -> DbResult<Option<Job>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1");
        self.fetch_job(sqlx::query_as(&sql).bind(id.as_str())).await
    }

    /// List an owner's jobs, newest first.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        owner_id: &str,
        status: Option<JobStatus>,
        limit: i64,
    ) -> DbResult<Vec<Job>> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM jobs \
             WHERE owner_id = $1 AND ($2::text IS NULL OR status = $2) \
             ORDER BY created_at DESC, id LIMIT $3"
        );
        let rows = sqlx::query_as::<_, JobRow>(&sql)
            .bind(owner_id)
            .bind(status.map(|s| s.as_str()))
            .bind(limit.max(0))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Job::try_from).collect()
    }

    /// `pending -> processing`. Returns `None` when the job is not pending.
    #[instrument(skip(self))]
    pub async fn mark_processing(&self, id: &JobId) -> DbResult<Option<Job>> {
        let sql = format!(
            "UPDATE jobs SET status = 'processing', attempts = attempts + 1, progress = 0, \
             started_at = now(), updated_at = now() \
             WHERE id = $1 AND status = 'pending' \
             RETURNING {JOB_COLUMNS}"
        );
        self.fetch_job(sqlx::query_as(&sql).bind(id.as_str())).await
    }

    /// Record progress on a processing job. Also refreshes `updated_at`, which
    /// keeps the job clear of the stale detector.
    #[instrument(skip(self))]
    pub async fn update_progress(&self, id: &JobId, progress: u8) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE jobs SET progress = GREATEST(progress, $2), updated_at = now() \
             WHERE id = $1 AND status = 'processing'",
        )
        .bind(id.as_str())
        .bind(i16::from(progress.min(100)))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// `processing -> completed`.
    #[instrument(skip(self, result))]
    pub async fn mark_completed(&self, id: &JobId, result: &JobResult) -> DbResult<Option<Job>> {
        let sql = format!(
            "UPDATE jobs SET status = 'completed', result = $2, error = NULL, progress = 100, \
             completed_at = now(), updated_at = now() \
             WHERE id = $1 AND status = 'processing' \
             RETURNING {JOB_COLUMNS}"
        );
        let row = sqlx::query_as::<_, JobRow>(&sql)
            .bind(id.as_str())
            .bind(Json(result))
            .fetch_optional(&self.pool)
            .await?;

        if row.is_none() {
            warn!(job_id = %id, "Completion ignored, job is no longer processing");
        }
        row.map(Job::try_from).transpose()
    }

    /// `processing -> failed`.
    #[instrument(skip(self))]
    pub async fn mark_failed(&self, id: &JobId, error: &str) -> DbResult<Option<Job>> {
        let sql = format!(
            "UPDATE jobs SET status = 'failed', error = $2, completed_at = now(), updated_at = now() \
             WHERE id = $1 AND status = 'processing' \
             RETURNING {JOB_COLUMNS}"
        );
        self.fetch_job(sqlx::query_as(&sql).bind(id.as_str()).bind(error))
            .await
    }

    /// `pending -> failed` for a job that never reached the queue.
    #[instrument(skip(self))]
    pub async fn fail_unqueued(&self, id: &JobId, error: &str) -> DbResult<Option<Job>> {
        let sql = format!(
            "UPDATE jobs SET status = 'failed', error = $2, completed_at = now(), updated_at = now() \
             WHERE id = $1 AND status = 'pending' \
             RETURNING {JOB_COLUMNS}"
        );
        self.fetch_job(sqlx::query_as(&sql).bind(id.as_str()).bind(error))
            .await
    }

    /// `processing -> pending` after a retryable failure.
    #[instrument(skip(self))]
    pub async fn requeue(&self, id: &JobId, error: &str) -> DbResult<Option<Job>> {
        let sql = format!(
            "UPDATE jobs SET status = 'pending', error = $2, progress = 0, updated_at = now() \
             WHERE id = $1 AND status = 'processing' \
             RETURNING {JOB_COLUMNS}"
        );
        self.fetch_job(sqlx::query_as(&sql).bind(id.as_str()).bind(error))
            .await
    }

    /// Manual retry: `failed -> pending` with a fresh attempt budget.
    #[instrument(skip(self))]
    pub async fn retry(&self, owner_id: &str, id: &JobId) -> DbResult<Job> {
        let sql = format!(
            "UPDATE jobs SET status = 'pending', attempts = 0, error = NULL, result = NULL, \
             progress = 0, started_at = NULL, completed_at = NULL, updated_at = now() \
             WHERE id = $1 AND owner_id = $2 AND status = 'failed' \
             RETURNING {JOB_COLUMNS}"
        );
        let query = sqlx::query_as(&sql).bind(id.as_str()).bind(owner_id);
        match self.fetch_job(query).await? {
            Some(job) => Ok(job),
            None => {
                let job = self.get(owner_id, id).await?;
                Err(DbError::conflict(format!(
                    "job {id} is {}, only failed jobs can be retried",
                    job.status
                )))
            }
        }
    }

    /// Fail processing jobs that have not been touched since `cutoff`.
    #[instrument(skip(self))]
    pub async fn fail_stale(&self, cutoff: DateTime<Utc>) -> DbResult<Vec<JobId>> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            UPDATE jobs
            SET status = 'failed', error = $2, completed_at = now(), updated_at = now()
            WHERE status = 'processing' AND updated_at < $1
            RETURNING id
            "#,
        )
        .bind(cutoff)
        .bind(STALE_JOB_ERROR)
        .fetch_all(&self.pool)
        .await?;

        if !ids.is_empty() {
            info!(count = ids.len(), "Failed stale jobs");
        }
        Ok(ids.into_iter().map(JobId::from_string).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pix_models::{MediaId, ResizeRequest, ResizeResult};

    fn row() -> JobRow {
        let request = JobRequest::Resize(ResizeRequest::new(
            MediaId::from_string("media-0001"),
            Some(320),
            None,
        ));
        let now = Utc::now();
        JobRow {
            id: "job-000001".to_string(),
            owner_id: "user-1".to_string(),
            kind: "resize".to_string(),
            request: serde_json::to_value(&request).unwrap(),
            status: "processing".to_string(),
            result: None,
            error: None,
            attempts: 1,
            max_attempts: 3,
            progress: 40,
            created_at: now,
            updated_at: now,
            started_at: Some(now),
            completed_at: None,
        }
    }

    #[test]
    fn test_row_to_job() {
        let job = Job::try_from(row()).unwrap();
        assert_eq!(job.kind, JobKind::Resize);
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.progress, 40);
        assert!(job.can_retry());
    }

    #[test]
    fn test_row_with_result() {
        let mut r = row();
        r.status = "completed".to_string();
        r.result = Some(
            serde_json::to_value(JobResult::Resize(ResizeResult {
                media_id: MediaId::from_string("media-0002"),
                width: 320,
                height: 240,
            }))
            .unwrap(),
        );
        let job = Job::try_from(r).unwrap();
        assert!(matches!(job.result, Some(JobResult::Resize(_))));
    }

    #[test]
    fn test_row_with_unknown_status_fails() {
        let mut r = row();
        r.status = "paused".to_string();
        assert!(matches!(Job::try_from(r), Err(DbError::Decode(_))));
    }

    #[test]
    fn test_row_with_mismatched_kind_fails() {
        let mut r = row();
        r.kind = "zip".to_string();
        assert!(matches!(Job::try_from(r), Err(DbError::Decode(_))));
    }

    #[test]
    fn test_progress_clamped() {
        let mut r = row();
        r.progress = 250;
        assert_eq!(Job::try_from(r).unwrap().progress, 100);
    }
}
