//! Signed file links and file responses.

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use tracing::debug;

use pix_storage::{FileScope, FileToken};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Make a name safe for a quoted `Content-Disposition` filename.
pub(crate) fn disposition_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

pub(crate) fn guess_content_type(filename: &str) -> String {
    mime_guess::from_path(filename)
        .first_raw()
        .unwrap_or("application/octet-stream")
        .to_string()
}

/// Build a response carrying a stored object.
pub(crate) fn file_response(
    data: Vec<u8>,
    content_type: &str,
    filename: &str,
    scope: FileScope,
) -> Response {
    let disposition = match scope {
        FileScope::View => "inline",
        FileScope::Download => "attachment",
    };
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("{}; filename=\"{}\"", disposition, disposition_filename(filename)),
            ),
            (header::CACHE_CONTROL, "private, max-age=300".to_string()),
        ],
        data,
    )
        .into_response()
}

/// GET /files/:token
///
/// Serve the object a signed link points at. No authentication; the token is
/// the credential.
pub async fn serve_signed_file(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<Response> {
    let token = FileToken::verify(&token, &state.config.file_token_secret)?
        .ok_or_else(|| ApiError::not_found("Link expired or invalid"))?;

    debug!(media_id = %token.mid, scope = token.scope.as_str(), "Serving signed file");
    let object = state.store.get(&token.key).await?;
    let filename = token.key.rsplit('/').next().unwrap_or("file");
    let content_type = object.content_type.unwrap_or_else(|| guess_content_type(filename));

    Ok(file_response(object.data, &content_type, filename, token.scope))
}
