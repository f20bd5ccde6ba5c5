//! Shared data models for the Pixvault backend.
//!
//! This crate provides Serde-serializable types for:
//! - Media items, galleries and publications
//! - Transformation jobs, their requests and results
//! - Job progress events
//! - Geometry and encoding limits

pub mod encoding;
pub mod event;
pub mod gallery;
pub mod ids;
pub mod job;
pub mod media;
pub mod publication;
pub mod rect;
pub mod request;
pub mod result;

// Re-export common types
pub use event::JobEvent;
pub use gallery::{order_items, Gallery, OrderedItem, MAX_TITLE_LEN};
pub use ids::{is_valid_id, GalleryId, JobId, MediaId, PublicationId};
pub use job::{Job, JobKind, JobStatus};
pub use media::{extension_for, MediaItem, MediaKind};
pub use publication::{Publication, PublicationState};
pub use rect::{NormalizedRect, PixelRect};
pub use request::{
    JobRequest, OutputFormat, RequestError, ResizeFit, ResizeRequest, SmartCropRequest,
    TranscodePreset, TranscodeRequest, VideoMetadataRequest, ZipRequest, ZipSource,
};
pub use result::{CropResult, JobResult, ResizeResult, TranscodeResult, VideoMetadata, ZipResult};
