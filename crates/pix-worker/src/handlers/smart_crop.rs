//! Smart crop: pick the most salient region of an image and scale it to the
//! requested size.

use pix_media::{image_ops, smart_crop, Crop, CropOptions, MediaResult};
use pix_models::{
    CropResult, JobResult, MediaId, MediaItem, MediaKind, OutputFormat, SmartCropRequest,
};
use pix_storage::keys::derived_key;

use super::{derived_filename, load_bytes, load_media, require_kind, run_blocking, store_output};
use crate::context::{JobProgress, WorkerContext};
use crate::error::WorkerResult;
use crate::logging::JobLogger;

pub(super) struct Rendered {
    pub data: Vec<u8>,
    pub crop: Crop,
}

/// Decode, crop and re-encode.
pub(super) fn render(
    bytes: &[u8],
    req: &SmartCropRequest,
    format: OutputFormat,
) -> MediaResult<Rendered> {
    let img = image_ops::decode(bytes)?;
    let options = CropOptions {
        min_scale: req.min_scale,
        rule_of_thirds: req.rule_of_thirds,
    };
    let (cropped, crop) = smart_crop(&img, req.width, req.height, options)?;
    let data = image_ops::encode(&cropped, format, None)?;
    Ok(Rendered { data, crop })
}

pub(super) async fn run(
    ctx: &WorkerContext,
    owner_id: &str,
    req: &SmartCropRequest,
    progress: &JobProgress,
) -> WorkerResult<JobResult> {
    let logger = JobLogger::new(progress.job_id(), pix_models::JobKind::SmartCrop);

    let source = load_media(ctx, owner_id, &req.media_id).await?;
    require_kind(&source, MediaKind::Image)?;
    let bytes = load_bytes(ctx, &source).await?;
    progress.report(20).await;

    let format = req
        .format
        .unwrap_or_else(|| OutputFormat::for_content_type(&source.content_type));
    let request = req.clone();
    let rendered = run_blocking(move || render(&bytes, &request, format)).await?;
    logger.progress(
        &format!(
            "Crop {}x{} at ({}, {}) score {:.3}",
            rendered.crop.rect.width,
            rendered.crop.rect.height,
            rendered.crop.rect.x,
            rendered.crop.rect.y,
            rendered.crop.score
        ),
    );
    progress.report(70).await;

    let id = MediaId::new();
    let item = MediaItem::new(
        owner_id,
        MediaKind::Image,
        derived_filename(
            &source.filename,
            &format!("crop-{}x{}", req.width, req.height),
            format.extension(),
        ),
        format.content_type(),
        derived_key(owner_id, &id, format.extension()),
        rendered.data.len() as i64,
    )
    .with_id(id)
    .with_dimensions(req.width, req.height)
    .with_source(source.id.clone());

    let item = store_output(ctx, item, rendered.data).await?;
    progress.report(95).await;

    Ok(JobResult::SmartCrop(CropResult {
        media_id: item.id,
        crop: rendered.crop.rect,
        score: rendered.crop.score,
        width: req.width,
        height: req.height,
    }))
}
