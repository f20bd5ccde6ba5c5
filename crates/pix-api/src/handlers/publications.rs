//! Publications: ordered image sets released now or at a scheduled time.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;
use validator::Validate;

use pix_models::{order_items, MediaId, Publication, PublicationId, PublicationState};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePublicationRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[serde(default)]
    #[validate(length(max = 1000))]
    pub media_ids: Vec<MediaId>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    pub scheduled_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListPublicationsQuery {
    pub state: Option<PublicationState>,
}

/// Schedules must point at the future.
fn ensure_future(at: DateTime<Utc>, now: DateTime<Utc>) -> ApiResult<()> {
    if at <= now {
        return Err(ApiError::Validation(
            "scheduled_at must be in the future".to_string(),
        ));
    }
    Ok(())
}

/// POST /api/publications
pub async fn create_publication(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreatePublicationRequest>,
) -> ApiResult<(StatusCode, Json<Publication>)> {
    req.validate()?;
    let title = req.title.trim();
    if title.is_empty() {
        return Err(ApiError::Validation("title must not be blank".to_string()));
    }
    if let Some(at) = req.scheduled_at {
        ensure_future(at, Utc::now())?;
    }

    let mut publication = Publication::new(&user.owner_id, title)
        .with_items(order_items(&req.media_ids))
        .with_schedule(req.scheduled_at);
    publication.description = req.description;

    state.db.publications().create(&publication).await?;
    info!(
        publication_id = %publication.id,
        owner_id = %user.owner_id,
        state = publication.state().as_str(),
        "Publication created"
    );
    Ok((StatusCode::CREATED, Json(publication)))
}

/// GET /api/publications
pub async fn list_publications(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListPublicationsQuery>,
) -> ApiResult<Json<Vec<Publication>>> {
    let publications = state
        .db
        .publications()
        .list(&user.owner_id, query.state)
        .await?;
    Ok(Json(publications))
}

/// GET /api/publications/:id
pub async fn get_publication(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<PublicationId>,
) -> ApiResult<Json<Publication>> {
    Ok(Json(state.db.publications().get(&user.owner_id, &id).await?))
}

/// DELETE /api/publications/:id
pub async fn delete_publication(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<PublicationId>,
) -> ApiResult<StatusCode> {
    state.db.publications().delete(&user.owner_id, &id).await?;
    info!(publication_id = %id, owner_id = %user.owner_id, "Publication deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/publications/:id/schedule
///
/// Sets or moves the schedule. Published publications answer 409.
pub async fn schedule_publication(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<PublicationId>,
    Json(req): Json<ScheduleRequest>,
) -> ApiResult<Json<Publication>> {
    ensure_future(req.scheduled_at, Utc::now())?;
    let publication = state
        .db
        .publications()
        .schedule(&user.owner_id, &id, req.scheduled_at)
        .await?;
    info!(publication_id = %id, scheduled_at = %req.scheduled_at, "Publication scheduled");
    Ok(Json(publication))
}

/// DELETE /api/publications/:id/schedule
///
/// Back to draft.
pub async fn unschedule_publication(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<PublicationId>,
) -> ApiResult<Json<Publication>> {
    let publication = state
        .db
        .publications()
        .unschedule(&user.owner_id, &id)
        .await?;
    Ok(Json(publication))
}

/// POST /api/publications/:id/publish
pub async fn publish_publication(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<PublicationId>,
) -> ApiResult<Json<Publication>> {
    let publication = state
        .db
        .publications()
        .publish_now(&user.owner_id, &id)
        .await?;
    info!(publication_id = %id, owner_id = %user.owner_id, "Publication published");
    Ok(Json(publication))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_ensure_future() {
        let now = Utc::now();
        assert!(ensure_future(now + Duration::minutes(5), now).is_ok());
        assert!(ensure_future(now, now).is_err());
        assert!(ensure_future(now - Duration::days(1), now).is_err());
    }

    #[test]
    fn test_create_request_defaults() {
        let req: CreatePublicationRequest =
            serde_json::from_str(r#"{"title": "Launch"}"#).unwrap();
        assert!(req.media_ids.is_empty());
        assert!(req.scheduled_at.is_none());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_list_query_parses_state() {
        let q: ListPublicationsQuery =
            serde_json::from_str(r#"{"state": "scheduled"}"#).unwrap();
        assert_eq!(q.state, Some(PublicationState::Scheduled));
    }
}
