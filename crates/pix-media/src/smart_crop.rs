//! Content-aware cropping.
//!
//! The image is reduced to an analysis copy, per-pixel features (edge detail,
//! skin tone, saturation) are pooled into a coarse grid, and every candidate
//! crop of the target aspect ratio is scored by weighting those features with
//! a position-dependent importance: high near the crop center and on the
//! thirds lines, negative near the crop border and outside it.
//!
//! Candidates are evaluated center-first and only a strictly better score
//! replaces the current best, so featureless images get a centered crop.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, RgbImage};
use tracing::debug;

use pix_models::PixelRect;

use crate::error::{MediaError, MediaResult};

/// Longest side of the analysis copy.
const ANALYSIS_SIZE: u32 = 256;
/// Side of the pooling cell used when scoring.
const SCORE_DOWNSAMPLE: u32 = 8;
/// Sliding step between candidates, in analysis pixels.
const STEP: u32 = 8;
const SCALE_STEP: f64 = 0.1;

const SKIN_COLOR: [f64; 3] = [0.78, 0.57, 0.44];
const SKIN_THRESHOLD: f64 = 0.8;
const SKIN_BRIGHTNESS_MIN: f64 = 0.2;
const SKIN_BRIGHTNESS_MAX: f64 = 1.0;
const SATURATION_THRESHOLD: f64 = 0.4;
const SATURATION_BRIGHTNESS_MIN: f64 = 0.05;
const SATURATION_BRIGHTNESS_MAX: f64 = 0.9;

const EDGE_RADIUS: f64 = 0.4;
const EDGE_WEIGHT: f64 = -20.0;
const OUTSIDE_IMPORTANCE: f64 = -0.5;
const SKIN_BIAS: f64 = 0.01;
const SATURATION_BIAS: f64 = 0.2;
const DETAIL_WEIGHT: f64 = 0.2;
const SKIN_WEIGHT: f64 = 1.8;
const SATURATION_WEIGHT: f64 = 0.1;

const TIE_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Copy)]
pub struct CropOptions {
    /// Smallest crop to try relative to the largest one, in (0, 1].
    pub min_scale: f64,
    pub rule_of_thirds: bool,
}

impl Default for CropOptions {
    fn default() -> Self {
        Self {
            min_scale: 1.0,
            rule_of_thirds: true,
        }
    }
}

/// Chosen crop in source pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Crop {
    pub rect: PixelRect,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct Features {
    detail: f64,
    skin: f64,
    saturation: f64,
}

/// Features pooled into `SCORE_DOWNSAMPLE`-sized cells.
struct FeatureGrid {
    /// Analysis image size
    width: u32,
    height: u32,
    cols: u32,
    rows: u32,
    cells: Vec<Features>,
}

impl FeatureGrid {
    fn cell_center(&self, col: u32, row: u32) -> (f64, f64) {
        let x0 = col * SCORE_DOWNSAMPLE;
        let y0 = row * SCORE_DOWNSAMPLE;
        let x1 = (x0 + SCORE_DOWNSAMPLE).min(self.width);
        let y1 = (y0 + SCORE_DOWNSAMPLE).min(self.height);
        ((x0 + x1) as f64 / 2.0, (y0 + y1) as f64 / 2.0)
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    scale: f64,
}

fn lightness(p: [f64; 3]) -> f64 {
    0.2126 * p[0] + 0.7152 * p[1] + 0.0722 * p[2]
}

fn hsl_saturation(p: [f64; 3]) -> f64 {
    let max = p[0].max(p[1]).max(p[2]);
    let min = p[0].min(p[1]).min(p[2]);
    if max == min {
        return 0.0;
    }
    let l = (max + min) / 2.0;
    let d = max - min;
    if l > 0.5 {
        d / (2.0 - max - min)
    } else {
        d / (max + min)
    }
}

fn skin_score(p: [f64; 3], l: f64) -> f64 {
    let mag = (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt();
    if mag == 0.0 {
        return 0.0;
    }
    let rd = p[0] / mag - SKIN_COLOR[0];
    let gd = p[1] / mag - SKIN_COLOR[1];
    let bd = p[2] / mag - SKIN_COLOR[2];
    let skin = 1.0 - (rd * rd + gd * gd + bd * bd).sqrt();
    if skin > SKIN_THRESHOLD && (SKIN_BRIGHTNESS_MIN..=SKIN_BRIGHTNESS_MAX).contains(&l) {
        (skin - SKIN_THRESHOLD) / (1.0 - SKIN_THRESHOLD)
    } else {
        0.0
    }
}

fn saturation_score(p: [f64; 3], l: f64) -> f64 {
    let sat = hsl_saturation(p);
    if sat > SATURATION_THRESHOLD
        && (SATURATION_BRIGHTNESS_MIN..=SATURATION_BRIGHTNESS_MAX).contains(&l)
    {
        (sat - SATURATION_THRESHOLD) / (1.0 - SATURATION_THRESHOLD)
    } else {
        0.0
    }
}

fn analyze(img: &RgbImage) -> FeatureGrid {
    let (w, h) = img.dimensions();
    let pixel = |x: u32, y: u32| {
        let p = img.get_pixel(x, y).0;
        [p[0] as f64 / 255.0, p[1] as f64 / 255.0, p[2] as f64 / 255.0]
    };

    let luma: Vec<f64> = (0..h)
        .flat_map(|y| (0..w).map(move |x| (x, y)))
        .map(|(x, y)| lightness(pixel(x, y)))
        .collect();
    let at = |x: u32, y: u32| luma[(y * w + x) as usize];

    let cols = w.div_ceil(SCORE_DOWNSAMPLE);
    let rows = h.div_ceil(SCORE_DOWNSAMPLE);
    let mut sums = vec![Features::default(); (cols * rows) as usize];
    let mut maxes = vec![Features::default(); (cols * rows) as usize];
    let mut counts = vec![0u32; (cols * rows) as usize];

    for y in 0..h {
        for x in 0..w {
            let p = pixel(x, y);
            let l = at(x, y);
            // Laplacian with edge replication
            let up = at(x, y.saturating_sub(1));
            let down = at(x, (y + 1).min(h - 1));
            let left = at(x.saturating_sub(1), y);
            let right = at((x + 1).min(w - 1), y);
            let detail = (4.0 * l - up - down - left - right).abs().min(1.0);

            let f = Features {
                detail,
                skin: skin_score(p, l),
                saturation: saturation_score(p, l),
            };

            let i = ((y / SCORE_DOWNSAMPLE) * cols + x / SCORE_DOWNSAMPLE) as usize;
            sums[i].detail += f.detail;
            sums[i].skin += f.skin;
            sums[i].saturation += f.saturation;
            maxes[i].detail = maxes[i].detail.max(f.detail);
            maxes[i].skin = maxes[i].skin.max(f.skin);
            maxes[i].saturation = maxes[i].saturation.max(f.saturation);
            counts[i] += 1;
        }
    }

    // Blend of mean and max keeps small sharp details visible after pooling
    let cells = sums
        .iter()
        .zip(&maxes)
        .zip(&counts)
        .map(|((s, m), &n)| {
            let n = n.max(1) as f64;
            Features {
                detail: 0.5 * s.detail / n + 0.5 * m.detail,
                skin: 0.5 * s.skin / n + 0.5 * m.skin,
                saturation: 0.5 * s.saturation / n + 0.5 * m.saturation,
            }
        })
        .collect();

    FeatureGrid {
        width: w,
        height: h,
        cols,
        rows,
        cells,
    }
}

fn thirds(x: f64) -> f64 {
    let x = ((x - 1.0 / 3.0 + 1.0) % 2.0) * 0.5 - 0.5;
    (1.0 - x * x * 16.0).max(0.0)
}

fn importance(crop: &Candidate, x: f64, y: f64, rule_of_thirds: bool) -> f64 {
    if x < crop.x || x >= crop.x + crop.width || y < crop.y || y >= crop.y + crop.height {
        return OUTSIDE_IMPORTANCE;
    }
    let px = ((0.5 - (x - crop.x) / crop.width).abs()) * 2.0;
    let py = ((0.5 - (y - crop.y) / crop.height).abs()) * 2.0;

    let dx = (px - 1.0 + EDGE_RADIUS).max(0.0);
    let dy = (py - 1.0 + EDGE_RADIUS).max(0.0);
    let d = (dx * dx + dy * dy) * EDGE_WEIGHT;

    let mut s = 1.41 - (px * px + py * py).sqrt();
    if rule_of_thirds {
        s += (s + d + 0.5).max(0.0) * 1.2 * (thirds(px) + thirds(py));
    }
    s + d
}

fn score(grid: &FeatureGrid, crop: &Candidate, rule_of_thirds: bool) -> f64 {
    let mut detail = 0.0;
    let mut skin = 0.0;
    let mut saturation = 0.0;

    for row in 0..grid.rows {
        for col in 0..grid.cols {
            let f = grid.cells[(row * grid.cols + col) as usize];
            let (x, y) = grid.cell_center(col, row);
            let i = importance(crop, x, y, rule_of_thirds);
            skin += f.skin * (f.detail + SKIN_BIAS) * i;
            detail += f.detail * i;
            saturation += f.saturation * (f.detail + SATURATION_BIAS) * i;
        }
    }

    (detail * DETAIL_WEIGHT + skin * SKIN_WEIGHT + saturation * SATURATION_WEIGHT)
        / (crop.width * crop.height)
}

/// Largest `aspect` box that fits in `w x h`.
fn max_box(w: f64, h: f64, aspect: f64) -> (f64, f64) {
    let bw = w.min(h * aspect);
    (bw, bw / aspect)
}

fn candidates(width: u32, height: u32, aspect: f64, min_scale: f64) -> Vec<Candidate> {
    let (w, h) = (width as f64, height as f64);
    let (base_w, base_h) = max_box(w, h, aspect);
    let mut out = Vec::new();

    let mut scale = 1.0;
    while scale >= min_scale - 1e-9 {
        let cw = (base_w * scale).max(1.0).min(w);
        let ch = (base_h * scale).max(1.0).min(h);

        out.push(Candidate {
            x: (w - cw) / 2.0,
            y: (h - ch) / 2.0,
            width: cw,
            height: ch,
            scale,
        });

        let mut y = 0.0;
        while y + ch <= h + 1e-9 {
            let mut x = 0.0;
            while x + cw <= w + 1e-9 {
                out.push(Candidate {
                    x,
                    y,
                    width: cw,
                    height: ch,
                    scale,
                });
                x += STEP as f64;
            }
            y += STEP as f64;
        }

        scale -= SCALE_STEP;
    }
    out
}

/// Find the best crop of aspect `width:height` in `img`.
///
/// The returned rectangle is in source pixels and always lies within the image.
pub fn find_crop(img: &DynamicImage, width: u32, height: u32, options: CropOptions) -> MediaResult<Crop> {
    let (iw, ih) = img.dimensions();
    if iw == 0 || ih == 0 {
        return Err(MediaError::invalid_image("image has zero size"));
    }
    if width == 0 || height == 0 {
        return Err(MediaError::invalid_image("crop target has zero size"));
    }
    let min_scale = if options.min_scale > 0.0 && options.min_scale <= 1.0 {
        options.min_scale
    } else {
        1.0
    };
    let aspect = width as f64 / height as f64;

    let factor = (ANALYSIS_SIZE as f64 / iw.max(ih) as f64).min(1.0);
    let aw = ((iw as f64 * factor).round() as u32).max(1);
    let ah = ((ih as f64 * factor).round() as u32).max(1);
    let analysis = if (aw, ah) == (iw, ih) {
        img.to_rgb8()
    } else {
        img.resize_exact(aw, ah, FilterType::Triangle).to_rgb8()
    };

    let grid = analyze(&analysis);

    let mut best: Option<(Candidate, f64)> = None;
    let all = candidates(aw, ah, aspect, min_scale);
    for candidate in &all {
        let s = score(&grid, candidate, options.rule_of_thirds);
        if best.map_or(true, |(_, b)| s > b + TIE_EPSILON) {
            best = Some((*candidate, s));
        }
    }
    let (best, best_score) = best.ok_or_else(|| MediaError::internal("no crop candidates"))?;

    // Map back to full resolution, recomputing the size there to keep the aspect exact
    let (full_w, full_h) = max_box(iw as f64, ih as f64, aspect);
    let cw = ((full_w * best.scale).round() as u32).clamp(1, iw);
    let ch = ((full_h * best.scale).round() as u32).clamp(1, ih);
    let x = ((best.x * iw as f64 / aw as f64).round() as u32).min(iw - cw);
    let y = ((best.y * ih as f64 / ah as f64).round() as u32).min(ih - ch);

    debug!(
        candidates = all.len(),
        score = best_score,
        x, y, width = cw, height = ch,
        "Smart crop selected"
    );

    Ok(Crop {
        rect: PixelRect::new(x, y, cw, ch),
        score: best_score,
    })
}

/// Crop `img` around its most salient region and resize to exactly `width x height`.
pub fn smart_crop(
    img: &DynamicImage,
    width: u32,
    height: u32,
    options: CropOptions,
) -> MediaResult<(DynamicImage, Crop)> {
    let crop = find_crop(img, width, height, options)?;
    let r = &crop.rect;
    let out = img
        .crop_imm(r.x, r.y, r.width, r.height)
        .resize_exact(width, height, FilterType::Lanczos3);
    Ok((out, crop))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn uniform(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([128, 128, 128])))
    }

    /// Dark image with a high-contrast checkerboard patch.
    fn with_patch(w: u32, h: u32, px: u32, py: u32, size: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, y| {
            let inside = x >= px && x < px + size && y >= py && y < py + size;
            if inside && ((x / 2) + (y / 2)) % 2 == 0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([10, 10, 10])
            }
        }))
    }

    #[test]
    fn test_uniform_image_centers() {
        let crop = find_crop(&uniform(200, 100), 100, 100, CropOptions::default()).unwrap();
        assert_eq!(crop.rect, PixelRect::new(50, 0, 100, 100));
    }

    #[test]
    fn test_follows_salient_region() {
        let img = with_patch(240, 80, 180, 20, 40);
        let crop = find_crop(&img, 80, 80, CropOptions::default()).unwrap();
        assert!(crop.rect.x >= 120, "crop at {:?}", crop.rect);
        assert!(crop.rect.fits_within(240, 80));
        assert!(crop.score > 0.0);
    }

    #[test]
    fn test_large_image_maps_back_to_source() {
        let img = with_patch(1024, 512, 800, 200, 160);
        let crop = find_crop(&img, 1, 1, CropOptions::default()).unwrap();
        assert_eq!((crop.rect.width, crop.rect.height), (512, 512));
        assert!(crop.rect.fits_within(1024, 512));
        assert!(crop.rect.x >= 256, "crop at {:?}", crop.rect);
    }

    #[test]
    fn test_min_scale_allows_smaller_crops() {
        let img = with_patch(200, 200, 150, 150, 40);
        let crop = find_crop(
            &img,
            100,
            100,
            CropOptions {
                min_scale: 0.5,
                rule_of_thirds: true,
            },
        )
        .unwrap();
        assert!(crop.rect.width >= 100 && crop.rect.width <= 200);
        assert_eq!(crop.rect.width, crop.rect.height);
        assert!(crop.rect.fits_within(200, 200));
    }

    #[test]
    fn test_target_larger_than_image() {
        let (out, crop) = smart_crop(&uniform(50, 40), 400, 100, CropOptions::default()).unwrap();
        assert_eq!(out.dimensions(), (400, 100));
        assert_eq!(crop.rect.width, 50);
        assert!(crop.rect.fits_within(50, 40));
    }

    #[test]
    fn test_single_pixel_image() {
        let (out, crop) = smart_crop(&uniform(1, 1), 10, 20, CropOptions::default()).unwrap();
        assert_eq!(crop.rect, PixelRect::new(0, 0, 1, 1));
        assert_eq!(out.dimensions(), (10, 20));
    }

    #[test]
    fn test_zero_target_rejected() {
        assert!(find_crop(&uniform(10, 10), 0, 10, CropOptions::default()).is_err());
    }

    #[test]
    fn test_thirds_peak() {
        assert!(thirds(1.0 / 3.0) > 0.99);
        assert_eq!(thirds(1.0), 0.0);
    }
}
