//! Object key layout.
//!
//! ```text
//! users/{owner}/originals/{media_id}.{ext}
//! users/{owner}/derived/{media_id}.{ext}
//! users/{owner}/archives/{media_id}.zip
//! ```

use pix_models::MediaId;

use crate::error::{StorageError, StorageResult};

const MAX_KEY_LEN: usize = 1024;

/// Key for an uploaded original.
pub fn original_key(owner_id: &str, media_id: &MediaId, ext: &str) -> String {
    format!("users/{}/originals/{}.{}", owner_id, media_id, ext)
}

/// Key for an image or video produced by a job.
pub fn derived_key(owner_id: &str, media_id: &MediaId, ext: &str) -> String {
    format!("users/{}/derived/{}.{}", owner_id, media_id, ext)
}

/// Key for a zip archive produced by a job.
pub fn archive_key(owner_id: &str, media_id: &MediaId) -> String {
    format!("users/{}/archives/{}.zip", owner_id, media_id)
}

/// Prefix holding everything a user owns.
pub fn user_prefix(owner_id: &str) -> String {
    format!("users/{}/", owner_id)
}

/// Reject keys that could escape the bucket root or confuse a filesystem backend.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() || key.len() > MAX_KEY_LEN {
        return Err(StorageError::invalid_key(key));
    }
    if key.starts_with('/') || key.contains('\\') || key.contains('\0') {
        return Err(StorageError::invalid_key(key));
    }
    if key
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(StorageError::invalid_key(key));
    }
    Ok(())
}
