//! Image decoding, resizing and encoding.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader};
use tracing::debug;

use pix_models::encoding::{DEFAULT_JPEG_QUALITY, MAX_DIMENSION};
use pix_models::{OutputFormat, ResizeFit};

use crate::error::{MediaError, MediaResult};

/// Largest image we are willing to decode, in pixels.
pub const MAX_PIXELS: u64 = 100_000_000;

/// Read image dimensions from the header without decoding pixels.
pub fn image_dimensions(bytes: &[u8]) -> MediaResult<(u32, u32)> {
    let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    if reader.format().is_none() {
        return Err(MediaError::UnsupportedFormat("unrecognized image data".into()));
    }
    Ok(reader.into_dimensions()?)
}

/// Decode an image, sniffing its format.
///
/// Rejects images over [`MAX_PIXELS`] before allocating the pixel buffer.
pub fn decode(bytes: &[u8]) -> MediaResult<DynamicImage> {
    let (w, h) = image_dimensions(bytes)?;
    if w == 0 || h == 0 {
        return Err(MediaError::invalid_image("image has zero size"));
    }
    if (w as u64) * (h as u64) > MAX_PIXELS {
        return Err(MediaError::invalid_image(format!(
            "{w}x{h} exceeds the {MAX_PIXELS} pixel limit"
        )));
    }
    Ok(image::load_from_memory(bytes)?)
}

/// Encode an image. `quality` only affects JPEG; PNG and WebP are lossless.
pub fn encode(img: &DynamicImage, format: OutputFormat, quality: Option<u8>) -> MediaResult<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    match format {
        OutputFormat::Jpeg => {
            let quality = quality.unwrap_or(DEFAULT_JPEG_QUALITY).clamp(1, 100);
            // JPEG has no alpha channel
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
            rgb.write_with_encoder(encoder)?;
        }
        OutputFormat::Png => img.write_to(&mut buf, ImageFormat::Png)?,
        OutputFormat::Webp => {
            let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
            rgba.write_to(&mut buf, ImageFormat::WebP)?
        }
    }
    Ok(buf.into_inner())
}

/// Compute the output size of a resize without touching pixels.
///
/// A missing dimension follows the source aspect ratio. `Contain` never
/// upscales; `Cover` and `Fill` always produce the exact box, which must stay
/// within [`MAX_DIMENSION`] per side and [`MAX_PIXELS`] overall.
pub fn target_size(
    src: (u32, u32),
    width: Option<u32>,
    height: Option<u32>,
    fit: ResizeFit,
) -> MediaResult<(u32, u32)> {
    let (sw, sh) = (src.0.max(1) as f64, src.1.max(1) as f64);
    let (bw, bh) = match (width, height) {
        (Some(w), Some(h)) => (w as f64, h as f64),
        (Some(w), None) => (w as f64, (w as f64 * sh / sw).round().max(1.0)),
        (None, Some(h)) => ((h as f64 * sw / sh).round().max(1.0), h as f64),
        (None, None) => (sw, sh),
    };

    match fit {
        ResizeFit::Contain => {
            let scale = (bw / sw).min(bh / sh).min(1.0);
            Ok((
                ((sw * scale).round() as u32).max(1),
                ((sh * scale).round() as u32).max(1),
            ))
        }
        ResizeFit::Cover | ResizeFit::Fill => {
            let limit = MAX_DIMENSION as f64;
            if bw > limit || bh > limit || bw * bh > MAX_PIXELS as f64 {
                return Err(MediaError::invalid_image(format!(
                    "resizing {}x{} to {bw}x{bh} exceeds the {MAX_DIMENSION}px side limit",
                    src.0, src.1
                )));
            }
            Ok((bw as u32, bh as u32))
        }
    }
}

/// Resize according to `fit`.
pub fn resize(
    img: &DynamicImage,
    width: Option<u32>,
    height: Option<u32>,
    fit: ResizeFit,
) -> MediaResult<DynamicImage> {
    let (w, h) = target_size(img.dimensions(), width, height, fit)?;
    debug!(
        src_width = img.width(),
        src_height = img.height(),
        width = w,
        height = h,
        ?fit,
        "Resizing image"
    );

    Ok(match fit {
        ResizeFit::Contain if (w, h) == img.dimensions() => img.clone(),
        ResizeFit::Contain | ResizeFit::Fill => img.resize_exact(w, h, FilterType::Lanczos3),
        ResizeFit::Cover => cover(img, w, h),
    })
}

/// Scale to cover `w x h`, then center-crop to it.
pub fn cover(img: &DynamicImage, w: u32, h: u32) -> DynamicImage {
    let (sw, sh) = img.dimensions();
    let scale = (w as f64 / sw as f64).max(h as f64 / sh as f64);
    let cw = ((w as f64 / scale).round() as u32).clamp(1, sw);
    let ch = ((h as f64 / scale).round() as u32).clamp(1, sh);
    let x = (sw - cw) / 2;
    let y = (sh - ch) / 2;
    img.crop_imm(x, y, cw, ch)
        .resize_exact(w, h, FilterType::Lanczos3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn sample(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }))
    }

    #[test]
    fn test_target_size_contain() {
        let size = |w, h| target_size((4000, 2000), w, h, ResizeFit::Contain).unwrap();
        assert_eq!(size(Some(1000), Some(1000)), (1000, 500));
        assert_eq!(size(Some(800), None), (800, 400));
        assert_eq!(size(None, Some(100)), (200, 100));
    }

    #[test]
    fn test_contain_never_upscales() {
        assert_eq!(
            target_size((300, 200), Some(1200), Some(1200), ResizeFit::Contain).unwrap(),
            (300, 200)
        );
        let img = sample(30, 20);
        let out = resize(&img, Some(100), None, ResizeFit::Contain).unwrap();
        assert_eq!(out.dimensions(), (30, 20));
    }

    #[test]
    fn test_cover_and_fill_are_exact() {
        let img = sample(64, 32);
        let out = |w, h, fit| resize(&img, w, h, fit).unwrap().dimensions();
        assert_eq!(out(Some(20), Some(20), ResizeFit::Cover), (20, 20));
        assert_eq!(out(Some(20), Some(50), ResizeFit::Fill), (20, 50));
        // Cover with a single dimension follows the aspect ratio
        assert_eq!(out(Some(32), None, ResizeFit::Cover), (32, 16));
    }

    #[test]
    fn test_derived_side_is_bounded() {
        // A 1x60000 strip scaled to 8192 wide would need a 491520000px tall canvas.
        for fit in [ResizeFit::Cover, ResizeFit::Fill] {
            let err = target_size((1, 60000), Some(MAX_DIMENSION), None, fit).unwrap_err();
            assert!(matches!(err, MediaError::InvalidImage(_)), "{fit:?}");
            assert!(target_size((60000, 1), None, Some(MAX_DIMENSION), fit).is_err());
        }

        assert!(target_size((10, 10), Some(MAX_DIMENSION), Some(MAX_DIMENSION), ResizeFit::Fill).is_ok());
        assert_eq!(
            target_size((1, 2), Some(4000), None, ResizeFit::Cover).unwrap(),
            (4000, 8000)
        );
        assert!(target_size((1, 2), Some(6000), None, ResizeFit::Cover).is_err());

        // Contain keeps the source size and is never rejected for it.
        assert_eq!(
            target_size((1, 60000), Some(MAX_DIMENSION), None, ResizeFit::Contain).unwrap(),
            (1, 60000)
        );

        let strip = sample(1, 600);
        assert!(resize(&strip, Some(MAX_DIMENSION), None, ResizeFit::Cover).is_err());
    }

    #[test]
    fn test_encode_decode_formats() {
        let img = sample(16, 8);
        for format in [OutputFormat::Jpeg, OutputFormat::Png, OutputFormat::Webp] {
            let bytes = encode(&img, format, Some(90)).unwrap();
            assert_eq!(image_dimensions(&bytes).unwrap(), (16, 8), "{format:?}");
            let back = decode(&bytes).unwrap();
            assert_eq!(back.dimensions(), (16, 8));
        }
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode(b"definitely not an image").is_err());
    }
}
