//! Media upload, listing and delivery.

use std::time::Duration;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use validator::Validate;

use pix_models::{extension_for, MediaId, MediaItem, MediaKind};
use pix_storage::keys::original_key;
use pix_storage::{FileScope, FileToken, DEFAULT_EXPIRY_SECS};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::handlers::files::{file_response, guess_content_type};
use crate::handlers::Paging;
use crate::metrics;
use crate::state::AppState;

/// Multipart field carrying the file.
const FILE_FIELD: &str = "file";
const MAX_FILENAME_LEN: usize = 255;

/// Base name of an uploaded file, stripped of directories and control characters.
fn clean_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_FILENAME_LEN)
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Pick the stored content type: the declared one if we accept it, else a
/// guess from the file name.
fn resolve_content_type(declared: Option<&str>, filename: &str) -> ApiResult<(String, MediaKind)> {
    let declared = declared.map(|ct| {
        ct.split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
    });
    let candidates = declared
        .into_iter()
        .chain(std::iter::once(guess_content_type(filename)));

    for content_type in candidates {
        match MediaKind::from_content_type(&content_type) {
            Some(MediaKind::Archive) | None => continue,
            Some(kind) => return Ok((content_type, kind)),
        }
    }
    Err(ApiError::UnsupportedMediaType(format!(
        "{filename} is not a supported image or video"
    )))
}

#[derive(Debug, Deserialize)]
pub struct ListMediaQuery {
    pub kind: Option<MediaKind>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct MediaList {
    pub items: Vec<MediaItem>,
    pub limit: i64,
    pub offset: i64,
}

/// POST /api/media
///
/// Multipart upload with a single `file` field. Images are probed for their
/// dimensions; videos are stored as-is (use a `video_metadata` job to probe).
pub async fn upload_media(
    State(state): State<AppState>,
    user: AuthUser,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<MediaItem>)> {
    let max = state.config.max_upload_size;

    while let Some(mut field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = clean_filename(field.file_name().unwrap_or_default());
        let (content_type, kind) = resolve_content_type(field.content_type(), &filename)?;

        let mut data = Vec::new();
        while let Some(chunk) = field.chunk().await? {
            if data.len() + chunk.len() > max {
                return Err(ApiError::PayloadTooLarge(format!(
                    "uploads are limited to {max} bytes"
                )));
            }
            data.extend_from_slice(&chunk);
        }
        if data.is_empty() {
            return Err(ApiError::bad_request("uploaded file is empty"));
        }

        let item = store_upload(&state, &user.owner_id, filename, content_type, kind, data).await?;
        return Ok((StatusCode::CREATED, Json(item)));
    }

    Err(ApiError::bad_request(format!(
        "multipart field '{FILE_FIELD}' is required"
    )))
}

async fn store_upload(
    state: &AppState,
    owner_id: &str,
    filename: String,
    content_type: String,
    kind: MediaKind,
    data: Vec<u8>,
) -> ApiResult<MediaItem> {
    let dimensions = match kind {
        MediaKind::Image => Some(pix_media::image_dimensions(&data).map_err(|e| {
            ApiError::Validation(format!("could not read image: {e}"))
        })?),
        _ => None,
    };

    let id = MediaId::new();
    let key = original_key(owner_id, &id, extension_for(&content_type));
    let size = data.len();
    let mut item = MediaItem::new(owner_id, kind, filename, content_type, key, size as i64).with_id(id);
    if let Some((w, h)) = dimensions {
        item = item.with_dimensions(w, h);
    }

    state
        .store
        .put_bytes(&item.storage_key, data, &item.content_type)
        .await?;

    if let Err(e) = state.db.media().insert(&item).await {
        if let Err(cleanup) = state.store.delete(&item.storage_key).await {
            warn!(key = %item.storage_key, "Failed to remove orphaned upload: {}", cleanup);
        }
        return Err(e.into());
    }

    metrics::record_upload(kind.as_str(), size as u64);
    info!(media_id = %item.id, owner_id = %owner_id, kind = kind.as_str(), size, "Media uploaded");
    Ok(item)
}

/// GET /api/media
pub async fn list_media(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListMediaQuery>,
) -> ApiResult<Json<MediaList>> {
    let paging = Paging {
        limit: query.limit,
        offset: query.offset,
    };
    let (limit, offset) = (paging.limit(), paging.offset());
    let items = state
        .db
        .media()
        .list(&user.owner_id, query.kind, limit, offset)
        .await?;
    Ok(Json(MediaList {
        items,
        limit,
        offset,
    }))
}

/// GET /api/media/:id
pub async fn get_media(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<MediaId>,
) -> ApiResult<Json<MediaItem>> {
    Ok(Json(state.db.media().get(&user.owner_id, &id).await?))
}

/// DELETE /api/media/:id
///
/// Removes the row first; the object is removed best-effort afterwards.
pub async fn delete_media(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<MediaId>,
) -> ApiResult<StatusCode> {
    let item = state.db.media().delete(&user.owner_id, &id).await?;
    if let Err(e) = state.store.delete(&item.storage_key).await {
        warn!(media_id = %id, key = %item.storage_key, "Failed to delete object: {}", e);
    }
    info!(media_id = %id, owner_id = %user.owner_id, "Media deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
pub struct FileQuery {
    #[serde(default)]
    pub download: bool,
}

/// GET /api/media/:id/file
pub async fn get_media_file(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<MediaId>,
    Query(query): Query<FileQuery>,
) -> ApiResult<Response> {
    let item = state.db.media().get(&user.owner_id, &id).await?;
    let data = state.store.get_bytes(&item.storage_key).await?;
    let scope = if query.download {
        FileScope::Download
    } else {
        FileScope::View
    };
    Ok(file_response(data, &item.content_type, &item.filename, scope))
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct CreateLinkRequest {
    pub scope: Option<FileScope>,
    /// Capped at 7 days
    #[validate(range(min = 1, max = 604800))]
    pub expires_in_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct LinkResponse {
    pub url: String,
    pub token: String,
    pub scope: FileScope,
    pub expires_in: u64,
}

/// POST /api/media/:id/link
pub async fn create_media_link(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<MediaId>,
    Json(req): Json<CreateLinkRequest>,
) -> ApiResult<Json<LinkResponse>> {
    req.validate()?;
    let item = state.db.media().get(&user.owner_id, &id).await?;

    let scope = req.scope.unwrap_or(FileScope::View);
    let expiry = Duration::from_secs(req.expires_in_secs.unwrap_or(DEFAULT_EXPIRY_SECS));
    let file_token = FileToken::new(item.id.as_str(), &item.storage_key, scope, expiry);
    let token = file_token.sign(&state.config.file_token_secret)?;

    Ok(Json(LinkResponse {
        url: format!("/files/{token}"),
        token,
        scope,
        expires_in: file_token.expires_in(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_filename() {
        assert_eq!(clean_filename("../../etc/passwd"), "passwd");
        assert_eq!(clean_filename("C:\\Users\\me\\pic.jpg"), "pic.jpg");
        assert_eq!(clean_filename("a\u{0}b.png"), "ab.png");
        assert_eq!(clean_filename(""), "upload");
        assert_eq!(clean_filename(".."), "upload");
        assert_eq!(clean_filename(&"x".repeat(400)).len(), MAX_FILENAME_LEN);
    }

    #[test]
    fn test_resolve_content_type() {
        let (ct, kind) = resolve_content_type(Some("image/JPEG; charset=x"), "a.bin").unwrap();
        assert_eq!((ct.as_str(), kind), ("image/jpeg", MediaKind::Image));

        // Generic declared type falls back to the extension.
        let (ct, kind) = resolve_content_type(Some("application/octet-stream"), "clip.mp4").unwrap();
        assert_eq!((ct.as_str(), kind), ("video/mp4", MediaKind::Video));

        let (ct, _) = resolve_content_type(None, "photo.png").unwrap();
        assert_eq!(ct, "image/png");
    }

    #[test]
    fn test_resolve_content_type_rejects_others() {
        assert!(matches!(
            resolve_content_type(Some("text/plain"), "notes.txt"),
            Err(ApiError::UnsupportedMediaType(_))
        ));
        // Archives are produced by jobs, never uploaded.
        assert!(resolve_content_type(Some("application/zip"), "a.zip").is_err());
    }

    #[test]
    fn test_link_request_validation() {
        let ok = CreateLinkRequest {
            scope: None,
            expires_in_secs: Some(3600),
        };
        assert!(ok.validate().is_ok());

        let too_long = CreateLinkRequest {
            scope: Some(FileScope::Download),
            expires_in_secs: Some(30 * 24 * 3600),
        };
        assert!(too_long.validate().is_err());
    }
}
