//! Resize an image into a bounding box.

use pix_media::{image_ops, MediaResult};
use pix_models::{JobResult, MediaId, MediaItem, MediaKind, OutputFormat, ResizeRequest, ResizeResult};
use pix_storage::keys::derived_key;

use super::{derived_filename, load_bytes, load_media, require_kind, run_blocking, store_output};
use crate::context::{JobProgress, WorkerContext};
use crate::error::WorkerResult;

pub(super) struct Rendered {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

pub(super) fn render(bytes: &[u8], req: &ResizeRequest, format: OutputFormat) -> MediaResult<Rendered> {
    let img = image_ops::decode(bytes)?;
    let out = image_ops::resize(&img, req.width, req.height, req.fit)?;
    let data = image_ops::encode(&out, format, req.quality)?;
    Ok(Rendered {
        data,
        width: out.width(),
        height: out.height(),
    })
}

pub(super) async fn run(
    ctx: &WorkerContext,
    owner_id: &str,
    req: &ResizeRequest,
    progress: &JobProgress,
) -> WorkerResult<JobResult> {
    let source = load_media(ctx, owner_id, &req.media_id).await?;
    require_kind(&source, MediaKind::Image)?;
    let bytes = load_bytes(ctx, &source).await?;
    progress.report(20).await;

    let format = req
        .format
        .unwrap_or_else(|| OutputFormat::for_content_type(&source.content_type));
    let request = req.clone();
    let rendered = run_blocking(move || render(&bytes, &request, format)).await?;
    progress.report(70).await;

    let id = MediaId::new();
    let item = MediaItem::new(
        owner_id,
        MediaKind::Image,
        derived_filename(
            &source.filename,
            &format!("{}x{}", rendered.width, rendered.height),
            format.extension(),
        ),
        format.content_type(),
        derived_key(owner_id, &id, format.extension()),
        rendered.data.len() as i64,
    )
    .with_id(id)
    .with_dimensions(rendered.width, rendered.height)
    .with_source(source.id.clone());

    let (width, height) = (rendered.width, rendered.height);
    let item = store_output(ctx, item, rendered.data).await?;
    progress.report(95).await;

    Ok(JobResult::Resize(ResizeResult {
        media_id: item.id,
        width,
        height,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use pix_models::ResizeFit;
    use std::io::Cursor;

    fn png(w: u32, h: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([200, 100, 50])));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn request(width: Option<u32>, height: Option<u32>, fit: ResizeFit) -> ResizeRequest {
        ResizeRequest::new(MediaId::from_string("media-src01"), width, height).with_fit(fit)
    }

    #[test]
    fn test_contain_keeps_aspect() {
        let rendered = render(
            &png(400, 200),
            &request(Some(100), Some(100), ResizeFit::Contain),
            OutputFormat::Png,
        )
        .unwrap();
        assert_eq!((rendered.width, rendered.height), (100, 50));

        let decoded = image::load_from_memory(&rendered.data).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (100, 50));
    }

    #[test]
    fn test_cover_fills_box() {
        let rendered = render(
            &png(400, 200),
            &request(Some(120), Some(120), ResizeFit::Cover),
            OutputFormat::Jpeg,
        )
        .unwrap();
        assert_eq!((rendered.width, rendered.height), (120, 120));
    }

    #[test]
    fn test_width_only_follows_aspect() {
        let rendered = render(
            &png(300, 150),
            &request(Some(60), None, ResizeFit::Fill),
            OutputFormat::Png,
        )
        .unwrap();
        assert_eq!((rendered.width, rendered.height), (60, 30));
    }

    #[test]
    fn test_tall_strip_cannot_be_blown_up() {
        let err = render(
            &png(1, 600),
            &request(Some(8192), None, ResizeFit::Cover),
            OutputFormat::Png,
        )
        .err()
        .expect("oversized output must be rejected");
        assert!(!crate::error::WorkerError::from(err).is_retryable());
    }
}
