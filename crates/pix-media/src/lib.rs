//! Media processing for Pixvault jobs.
//!
//! This crate provides:
//! - Image decoding, resizing and encoding
//! - Content-aware smart cropping
//! - Zip archive creation
//! - FFmpeg command building with progress parsing and cancellation
//! - FFprobe metadata, transcode presets and poster frames

pub mod archive;
pub mod command;
pub mod error;
pub mod image_ops;
pub mod probe;
pub mod progress;
pub mod smart_crop;
pub mod thumbnail;
pub mod transcode;

pub use archive::{create_zip, ArchiveEntry};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use image_ops::{decode, encode, image_dimensions, resize};
pub use probe::{parse_probe_output, probe_video};
pub use progress::FfmpegProgress;
pub use smart_crop::{find_crop, smart_crop, Crop, CropOptions};
pub use thumbnail::generate_thumbnail;
pub use transcode::{build_transcode_command, transcode};
