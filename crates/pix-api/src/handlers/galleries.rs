//! Gallery CRUD and item ordering.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::info;
use validator::Validate;

use pix_db::GalleryUpdate;
use pix_models::{Gallery, GalleryId, MediaId, OrderedItem};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const MAX_DESCRIPTION_LEN: usize = 2000;

/// Distinguishes an absent field from an explicit `null`.
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateGalleryRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    pub cover_media_id: Option<MediaId>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateGalleryRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub cover_media_id: Option<Option<MediaId>>,
}

impl UpdateGalleryRequest {
    fn into_update(self) -> ApiResult<GalleryUpdate> {
        if let Some(name) = &self.name {
            let len = name.trim().chars().count();
            if len == 0 || len > pix_models::MAX_TITLE_LEN {
                return Err(ApiError::Validation(format!(
                    "name must be 1-{} characters",
                    pix_models::MAX_TITLE_LEN
                )));
            }
        }
        if let Some(Some(description)) = &self.description {
            if description.chars().count() > MAX_DESCRIPTION_LEN {
                return Err(ApiError::Validation(format!(
                    "description must be at most {MAX_DESCRIPTION_LEN} characters"
                )));
            }
        }
        let update = GalleryUpdate {
            name: self.name.map(|n| n.trim().to_string()),
            description: self.description,
            cover_media_id: self.cover_media_id,
        };
        if update.is_empty() {
            return Err(ApiError::bad_request("nothing to update"));
        }
        Ok(update)
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct ItemsRequest {
    #[validate(length(min = 1, max = 1000))]
    pub media_ids: Vec<MediaId>,
}

#[derive(Debug, Serialize)]
pub struct GalleryDetail {
    #[serde(flatten)]
    pub gallery: Gallery,
    pub items: Vec<OrderedItem>,
}

#[derive(Debug, Serialize)]
pub struct ItemsResponse {
    pub items: Vec<OrderedItem>,
}

/// POST /api/galleries
pub async fn create_gallery(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateGalleryRequest>,
) -> ApiResult<(StatusCode, Json<Gallery>)> {
    req.validate()?;
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::Validation("name must not be blank".to_string()));
    }

    let mut gallery = Gallery::new(&user.owner_id, name).with_description(req.description);
    gallery.cover_media_id = req.cover_media_id;
    state.db.galleries().create(&gallery).await?;

    info!(gallery_id = %gallery.id, owner_id = %user.owner_id, "Gallery created");
    Ok((StatusCode::CREATED, Json(gallery)))
}

/// GET /api/galleries
pub async fn list_galleries(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<Vec<Gallery>>> {
    Ok(Json(state.db.galleries().list(&user.owner_id).await?))
}

/// GET /api/galleries/:id
pub async fn get_gallery(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<GalleryId>,
) -> ApiResult<Json<GalleryDetail>> {
    let repo = state.db.galleries();
    let gallery = repo.get(&user.owner_id, &id).await?;
    let items = repo.items(&user.owner_id, &id).await?;
    Ok(Json(GalleryDetail { gallery, items }))
}

/// PATCH /api/galleries/:id
pub async fn update_gallery(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<GalleryId>,
    Json(req): Json<UpdateGalleryRequest>,
) -> ApiResult<Json<Gallery>> {
    let update = req.into_update()?;
    let gallery = state
        .db
        .galleries()
        .update(&user.owner_id, &id, update)
        .await?;
    Ok(Json(gallery))
}

/// DELETE /api/galleries/:id
///
/// The gallery's media are left in place.
pub async fn delete_gallery(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<GalleryId>,
) -> ApiResult<StatusCode> {
    state.db.galleries().delete(&user.owner_id, &id).await?;
    info!(gallery_id = %id, owner_id = %user.owner_id, "Gallery deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/galleries/:id/items
///
/// Appends media to the end of the gallery. Items already present keep their
/// position.
pub async fn add_gallery_items(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<GalleryId>,
    Json(req): Json<ItemsRequest>,
) -> ApiResult<Json<ItemsResponse>> {
    req.validate()?;
    let items = state
        .db
        .galleries()
        .add_items(&user.owner_id, &id, &req.media_ids)
        .await?;
    Ok(Json(ItemsResponse { items }))
}

/// DELETE /api/galleries/:id/items/:media_id
pub async fn remove_gallery_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, media_id)): Path<(GalleryId, MediaId)>,
) -> ApiResult<StatusCode> {
    state
        .db
        .galleries()
        .remove_item(&user.owner_id, &id, &media_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/galleries/:id/items
///
/// `media_ids` must name exactly the gallery's current items, in the new order.
pub async fn reorder_gallery_items(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<GalleryId>,
    Json(req): Json<ItemsRequest>,
) -> ApiResult<Json<ItemsResponse>> {
    req.validate()?;
    let items = state
        .db
        .galleries()
        .reorder(&user.owner_id, &id, &req.media_ids)
        .await?;
    Ok(Json(ItemsResponse { items }))
}
