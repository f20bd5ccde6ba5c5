//! Job submission and status.

use std::collections::HashSet;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use tracing::{error, info, warn};

use pix_models::{Job, JobId, JobRequest, JobStatus, ZipSource};
use pix_queue::QueueJob;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::handlers::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::metrics;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ListJobsQuery {
    pub status: Option<JobStatus>,
    pub limit: Option<i64>,
}

/// Check that everything the request points at exists and belongs to the
/// caller, so obviously broken jobs never reach the queue.
async fn ensure_sources_exist(state: &AppState, owner_id: &str, request: &JobRequest) -> ApiResult<()> {
    if let Some(media_id) = request.source_media_id() {
        state.db.media().get(owner_id, media_id).await?;
        return Ok(());
    }

    if let JobRequest::Zip(req) = request {
        match &req.source {
            ZipSource::Media { media_ids } => {
                let unique: HashSet<_> = media_ids.iter().collect();
                let owned = state.db.media().count_owned(owner_id, media_ids).await?;
                if owned != unique.len() as i64 {
                    return Err(ApiError::not_found("one or more media items not found"));
                }
            }
            ZipSource::Gallery { gallery_id } => {
                state.db.galleries().get(owner_id, gallery_id).await?;
            }
            ZipSource::Publication { publication_id } => {
                state.db.publications().get(owner_id, publication_id).await?;
            }
        }
    }
    Ok(())
}

/// Push a persisted job onto the stream. If Redis refuses it, the row is
/// failed so it does not sit in `pending` forever.
async fn enqueue(state: &AppState, job: &Job) -> ApiResult<()> {
    let queued = QueueJob::from(job);
    if let Err(e) = state.queue.enqueue(&queued).await {
        error!(job_id = %job.id, "Failed to enqueue job: {}", e);
        if let Err(db_err) = state
            .db
            .jobs()
            .fail_unqueued(&job.id, &format!("could not enqueue: {e}"))
            .await
        {
            warn!(job_id = %job.id, "Failed to mark unqueued job as failed: {}", db_err);
        }
        return Err(ApiError::Unavailable("job queue unavailable".to_string()));
    }
    metrics::record_job_enqueued(job.kind.as_str());
    Ok(())
}

/// POST /api/jobs
///
/// Body is the `{type, payload}` envelope. Answers 202 with the pending job.
pub async fn create_job(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<JobRequest>,
) -> ApiResult<(StatusCode, Json<Job>)> {
    request.validate()?;
    ensure_sources_exist(&state, &user.owner_id, &request).await?;

    let job = Job::new(&user.owner_id, request);
    state.db.jobs().insert(&job).await?;
    enqueue(&state, &job).await?;

    info!(job_id = %job.id, owner_id = %user.owner_id, kind = job.kind.as_str(), "Job submitted");
    Ok((StatusCode::ACCEPTED, Json(job)))
}

/// GET /api/jobs
pub async fn list_jobs(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListJobsQuery>,
) -> ApiResult<Json<Vec<Job>>> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let jobs = state
        .db
        .jobs()
        .list(&user.owner_id, query.status, limit)
        .await?;
    Ok(Json(jobs))
}

/// GET /api/jobs/:id
pub async fn get_job(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<JobId>,
) -> ApiResult<Json<Job>> {
    Ok(Json(state.db.jobs().get(&user.owner_id, &id).await?))
}

/// POST /api/jobs/:id/retry
///
/// Only failed jobs can be retried; anything else answers 409.
pub async fn retry_job(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<JobId>,
) -> ApiResult<(StatusCode, Json<Job>)> {
    let job = state.db.jobs().retry(&user.owner_id, &id).await?;

    // The earlier submission's dedup key may still be live.
    if let Err(e) = state.queue.clear_dedup(&QueueJob::from(&job)).await {
        warn!(job_id = %id, "Failed to clear dedup key: {}", e);
    }
    enqueue(&state, &job).await?;

    info!(job_id = %id, owner_id = %user.owner_id, "Job retried");
    Ok((StatusCode::ACCEPTED, Json(job)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_query_parses_status() {
        let q: ListJobsQuery = serde_json::from_str(r#"{"status": "failed", "limit": 5}"#).unwrap();
        assert_eq!(q.status, Some(JobStatus::Failed));
        assert_eq!(q.limit, Some(5));
    }

    #[test]
    fn test_job_envelope_parses() {
        let body = r#"{"type": "resize", "payload": {"media_id": "m1", "width": 320}}"#;
        let request: JobRequest = serde_json::from_str(body).unwrap();
        assert_eq!(request.kind().as_str(), "resize");
        assert!(request.validate().is_ok());
    }
}
