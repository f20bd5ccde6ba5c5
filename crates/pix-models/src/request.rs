//! Transformation job requests.
//!
//! Every job is submitted as a `{type, payload}` envelope. The `type` picks
//! one of the request structs below and `payload` carries its fields.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::encoding::{is_valid_dimension, sanitize_archive_name, MAX_ARCHIVE_ENTRIES, MAX_DIMENSION};
use crate::{GalleryId, JobKind, MediaId, PublicationId};

/// Reasons a job request is rejected before it reaches the queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("{field} must be between 1 and {max}")]
    InvalidDimension { field: &'static str, max: u32 },

    #[error("resize needs at least one of width or height")]
    MissingDimension,

    #[error("min_scale must be within (0, 1]")]
    InvalidScale,

    #[error("quality must be between 1 and 100")]
    InvalidQuality,

    #[error("zip needs between 1 and {0} media items")]
    InvalidEntryCount(usize),

    #[error("archive name is empty after sanitizing")]
    InvalidArchiveName,
}

/// Encoded image format for derived images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Png,
    Webp,
}

impl OutputFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::Webp => "image/webp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
            OutputFormat::Webp => "webp",
        }
    }

    /// Pick the output format matching a source MIME type, falling back to JPEG.
    pub fn for_content_type(content_type: &str) -> Self {
        match content_type {
            "image/png" => OutputFormat::Png,
            "image/webp" => OutputFormat::Webp,
            _ => OutputFormat::Jpeg,
        }
    }
}

/// How a resize fits the source into the requested box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResizeFit {
    /// Scale down to fit inside the box, keeping aspect ratio. Never upscales.
    #[default]
    Contain,
    /// Scale to cover the box, then center-crop to it exactly.
    Cover,
    /// Stretch to exactly the box.
    Fill,
}

fn default_min_scale() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

/// Frame an image around its most salient region at a fixed output size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SmartCropRequest {
    pub media_id: MediaId,
    pub width: u32,
    pub height: u32,
    /// Smallest crop to consider, relative to the largest crop of the target aspect.
    #[serde(default = "default_min_scale")]
    pub min_scale: f64,
    /// Favor crops that put salient detail on the thirds lines
    #[serde(default = "default_true")]
    pub rule_of_thirds: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<OutputFormat>,
}

impl SmartCropRequest {
    pub fn new(media_id: MediaId, width: u32, height: u32) -> Self {
        Self {
            media_id,
            width,
            height,
            min_scale: default_min_scale(),
            rule_of_thirds: true,
            format: None,
        }
    }

    pub fn validate(&self) -> Result<(), RequestError> {
        check_dimension("width", self.width)?;
        check_dimension("height", self.height)?;
        if !(self.min_scale > 0.0 && self.min_scale <= 1.0) {
            return Err(RequestError::InvalidScale);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ResizeRequest {
    pub media_id: MediaId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default)]
    pub fit: ResizeFit,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<OutputFormat>,
    /// JPEG quality (1-100)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<u8>,
}

impl ResizeRequest {
    pub fn new(media_id: MediaId, width: Option<u32>, height: Option<u32>) -> Self {
        Self {
            media_id,
            width,
            height,
            fit: ResizeFit::default(),
            format: None,
            quality: None,
        }
    }

    pub fn with_fit(mut self, fit: ResizeFit) -> Self {
        self.fit = fit;
        self
    }

    pub fn validate(&self) -> Result<(), RequestError> {
        if self.width.is_none() && self.height.is_none() {
            return Err(RequestError::MissingDimension);
        }
        if let Some(w) = self.width {
            check_dimension("width", w)?;
        }
        if let Some(h) = self.height {
            check_dimension("height", h)?;
        }
        if let Some(q) = self.quality {
            if q == 0 || q > 100 {
                return Err(RequestError::InvalidQuality);
            }
        }
        Ok(())
    }
}

/// Which media items go into an archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ZipSource {
    Media { media_ids: Vec<MediaId> },
    Gallery { gallery_id: GalleryId },
    Publication { publication_id: PublicationId },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ZipRequest {
    pub source: ZipSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_name: Option<String>,
}

impl ZipRequest {
    pub fn validate(&self) -> Result<(), RequestError> {
        if let ZipSource::Media { media_ids } = &self.source {
            if media_ids.is_empty() || media_ids.len() > MAX_ARCHIVE_ENTRIES {
                return Err(RequestError::InvalidEntryCount(MAX_ARCHIVE_ENTRIES));
            }
        }
        if let Some(name) = &self.archive_name {
            if sanitize_archive_name(name).is_none() {
                return Err(RequestError::InvalidArchiveName);
            }
        }
        Ok(())
    }
}

/// Video transcode target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum TranscodePreset {
    /// H.264 + AAC in MP4 with faststart
    #[default]
    WebMp4,
    /// VP9 + Opus in WebM
    WebWebm,
    /// Short silent low-bitrate MP4 for hover previews
    Preview,
}

impl TranscodePreset {
    pub fn content_type(&self) -> &'static str {
        match self {
            TranscodePreset::WebMp4 | TranscodePreset::Preview => "video/mp4",
            TranscodePreset::WebWebm => "video/webm",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            TranscodePreset::WebMp4 | TranscodePreset::Preview => "mp4",
            TranscodePreset::WebWebm => "webm",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TranscodeRequest {
    pub media_id: MediaId,
    #[serde(default)]
    pub preset: TranscodePreset,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_width: Option<u32>,
}

impl TranscodeRequest {
    pub fn validate(&self) -> Result<(), RequestError> {
        if let Some(w) = self.max_width {
            check_dimension("max_width", w)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoMetadataRequest {
    pub media_id: MediaId,
}

/// The `{type, payload}` job envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum JobRequest {
    SmartCrop(SmartCropRequest),
    Resize(ResizeRequest),
    Zip(ZipRequest),
    Transcode(TranscodeRequest),
    VideoMetadata(VideoMetadataRequest),
}

impl JobRequest {
    pub fn kind(&self) -> JobKind {
        match self {
            JobRequest::SmartCrop(_) => JobKind::SmartCrop,
            JobRequest::Resize(_) => JobKind::Resize,
            JobRequest::Zip(_) => JobKind::Zip,
            JobRequest::Transcode(_) => JobKind::Transcode,
            JobRequest::VideoMetadata(_) => JobKind::VideoMetadata,
        }
    }

    pub fn validate(&self) -> Result<(), RequestError> {
        match self {
            JobRequest::SmartCrop(r) => r.validate(),
            JobRequest::Resize(r) => r.validate(),
            JobRequest::Zip(r) => r.validate(),
            JobRequest::Transcode(r) => r.validate(),
            JobRequest::VideoMetadata(_) => Ok(()),
        }
    }

    /// The single source media item, for job kinds that have one.
    pub fn source_media_id(&self) -> Option<&MediaId> {
        match self {
            JobRequest::SmartCrop(r) => Some(&r.media_id),
            JobRequest::Resize(r) => Some(&r.media_id),
            JobRequest::Transcode(r) => Some(&r.media_id),
            JobRequest::VideoMetadata(r) => Some(&r.media_id),
            JobRequest::Zip(_) => None,
        }
    }
}

fn check_dimension(field: &'static str, value: u32) -> Result<(), RequestError> {
    if is_valid_dimension(value) {
        Ok(())
    } else {
        Err(RequestError::InvalidDimension {
            field,
            max: MAX_DIMENSION,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_shape() {
        let req = JobRequest::SmartCrop(SmartCropRequest::new(
            MediaId::from_string("media-123"),
            400,
            300,
        ));
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["type"], "smart_crop");
        assert_eq!(value["payload"]["media_id"], "media-123");
        assert_eq!(value["payload"]["width"], 400);
    }

    #[test]
    fn test_parse_with_defaults() {
        let req: JobRequest = serde_json::from_value(json!({
            "type": "resize",
            "payload": { "media_id": "media-123", "width": 800 }
        }))
        .unwrap();
        match req {
            JobRequest::Resize(r) => {
                assert_eq!(r.fit, ResizeFit::Contain);
                assert_eq!(r.height, None);
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn test_parse_zip_gallery_source() {
        let req: JobRequest = serde_json::from_value(json!({
            "type": "zip",
            "payload": { "source": { "kind": "gallery", "gallery_id": "gal-12345" } }
        }))
        .unwrap();
        assert_eq!(req.kind(), JobKind::Zip);
        assert!(req.source_media_id().is_none());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_unknown_type_rejected() {
        let parsed: Result<JobRequest, _> = serde_json::from_value(json!({
            "type": "rotate",
            "payload": {}
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_validation_errors() {
        let id = MediaId::from_string("media-123");

        let crop = SmartCropRequest::new(id.clone(), 0, 100);
        assert!(matches!(
            crop.validate(),
            Err(RequestError::InvalidDimension { field: "width", .. })
        ));

        let mut crop = SmartCropRequest::new(id.clone(), 100, 100);
        crop.min_scale = 0.0;
        assert_eq!(crop.validate(), Err(RequestError::InvalidScale));

        let resize = ResizeRequest::new(id.clone(), None, None);
        assert_eq!(resize.validate(), Err(RequestError::MissingDimension));

        let mut resize = ResizeRequest::new(id, Some(100), None);
        resize.quality = Some(0);
        assert_eq!(resize.validate(), Err(RequestError::InvalidQuality));

        let zip = ZipRequest {
            source: ZipSource::Media { media_ids: vec![] },
            archive_name: None,
        };
        assert!(matches!(zip.validate(), Err(RequestError::InvalidEntryCount(_))));
    }
}
