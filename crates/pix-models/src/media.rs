//! Media item models.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::MediaId;

/// Kind of a stored media item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
    /// Zip archive produced by a job
    Archive,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Archive => "archive",
        }
    }

    /// Classify a MIME type. Returns `None` for types we don't store.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "image/jpeg" | "image/png" | "image/webp" | "image/gif" => Some(MediaKind::Image),
            "video/mp4" | "video/webm" | "video/quicktime" | "video/x-matroska" => {
                Some(MediaKind::Video)
            }
            "application/zip" => Some(MediaKind::Archive),
            _ => None,
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(MediaKind::Image),
            "video" => Ok(MediaKind::Video),
            "archive" => Ok(MediaKind::Archive),
            other => Err(format!("unknown media kind: {other}")),
        }
    }
}

/// A stored image, video or archive.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MediaItem {
    pub id: MediaId,
    pub owner_id: String,
    pub kind: MediaKind,
    /// Original (or generated) file name, used for downloads and archives
    pub filename: String,
    pub content_type: String,
    /// Object storage key
    pub storage_key: String,
    pub size_bytes: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    /// Source media for job outputs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub derived_from: Option<MediaId>,
    pub created_at: DateTime<Utc>,
}

impl MediaItem {
    /// Create a new media item record.
    pub fn new(
        owner_id: impl Into<String>,
        kind: MediaKind,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        storage_key: impl Into<String>,
        size_bytes: i64,
    ) -> Self {
        Self {
            id: MediaId::new(),
            owner_id: owner_id.into(),
            kind,
            filename: filename.into(),
            content_type: content_type.into(),
            storage_key: storage_key.into(),
            size_bytes,
            width: None,
            height: None,
            duration_secs: None,
            derived_from: None,
            created_at: Utc::now(),
        }
    }

    /// Use a pre-generated ID (when the storage key embeds it).
    pub fn with_id(mut self, id: MediaId) -> Self {
        self.id = id;
        self
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_duration(mut self, duration_secs: f64) -> Self {
        self.duration_secs = Some(duration_secs);
        self
    }

    pub fn with_source(mut self, source: MediaId) -> Self {
        self.derived_from = Some(source);
        self
    }

    pub fn is_image(&self) -> bool {
        self.kind == MediaKind::Image
    }

    pub fn is_video(&self) -> bool {
        self.kind == MediaKind::Video
    }

    /// File extension for the stored object, derived from the content type.
    pub fn extension(&self) -> &'static str {
        extension_for(&self.content_type)
    }
}

/// File extension for a MIME type we store.
pub fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "video/quicktime" => "mov",
        "video/x-matroska" => "mkv",
        "application/zip" => "zip",
        _ => "bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_content_type() {
        assert_eq!(MediaKind::from_content_type("image/jpeg"), Some(MediaKind::Image));
        assert_eq!(
            MediaKind::from_content_type("Video/MP4; codecs=avc1"),
            Some(MediaKind::Video)
        );
        assert_eq!(MediaKind::from_content_type("text/html"), None);
    }

    #[test]
    fn test_media_item_builder() {
        let item = MediaItem::new("user-1", MediaKind::Image, "a.png", "image/png", "k", 10)
            .with_dimensions(640, 480);
        assert!(item.is_image());
        assert_eq!(item.width, Some(640));
        assert_eq!(item.extension(), "png");
    }

    #[test]
    fn test_kind_parse_roundtrip() {
        for kind in [MediaKind::Image, MediaKind::Video, MediaKind::Archive] {
            assert_eq!(kind.as_str().parse::<MediaKind>().unwrap(), kind);
        }
    }
}
