//! Job results written back by the worker.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{JobKind, MediaId, PixelRect};

/// Outcome of a smart crop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CropResult {
    /// The derived image
    pub media_id: MediaId,
    /// Chosen region in source pixel coordinates
    pub crop: PixelRect,
    /// Salience score of the chosen region
    pub score: f64,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ResizeResult {
    pub media_id: MediaId,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ZipResult {
    pub media_id: MediaId,
    pub filename: String,
    pub entries: u32,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TranscodeResult {
    pub media_id: MediaId,
    pub duration_secs: f64,
    pub width: u32,
    pub height: u32,
    pub size_bytes: u64,
    /// Poster frame stored alongside the output, when one could be extracted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poster_media_id: Option<MediaId>,
}

/// Video stream information as reported by ffprobe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoMetadata {
    pub duration_secs: f64,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub codec: String,
    /// Bits per second
    pub bitrate: u64,
    pub size_bytes: u64,
    pub has_audio: bool,
}

/// Result payload stored on a completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobResult {
    SmartCrop(CropResult),
    Resize(ResizeResult),
    Zip(ZipResult),
    Transcode(TranscodeResult),
    VideoMetadata(VideoMetadata),
}

impl JobResult {
    pub fn kind(&self) -> JobKind {
        match self {
            JobResult::SmartCrop(_) => JobKind::SmartCrop,
            JobResult::Resize(_) => JobKind::Resize,
            JobResult::Zip(_) => JobKind::Zip,
            JobResult::Transcode(_) => JobKind::Transcode,
            JobResult::VideoMetadata(_) => JobKind::VideoMetadata,
        }
    }

    /// The media item the job produced, if any.
    pub fn output_media_id(&self) -> Option<&MediaId> {
        match self {
            JobResult::SmartCrop(r) => Some(&r.media_id),
            JobResult::Resize(r) => Some(&r.media_id),
            JobResult::Zip(r) => Some(&r.media_id),
            JobResult::Transcode(r) => Some(&r.media_id),
            JobResult::VideoMetadata(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_tagging() {
        let result = JobResult::Resize(ResizeResult {
            media_id: MediaId::from_string("media-out1"),
            width: 100,
            height: 50,
        });
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["type"], "resize");
        assert_eq!(value["width"], 100);
        assert_eq!(result.kind(), JobKind::Resize);
        assert_eq!(result.output_media_id().unwrap().as_str(), "media-out1");
    }
}
