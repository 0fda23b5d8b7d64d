// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image preprocessing ahead of recognition
//!
//! Pure image-to-image transforms, no shared state. Steps:
//! 1. Decode within dimension limits, apply EXIF orientation, convert to
//!    8-bit grayscale
//! 2. Downscale oversized images to `max_dimension`
//! 3. Linear contrast stretch between the 1st and 99th percentiles
//! 4. Skew detection (projection profile) and rotation when beyond threshold
//! 5. Otsu binarization

use image::{imageops::FilterType, DynamicImage, GrayImage, Luma};
use tracing::debug;

use super::image_utils::{
    decode_image_bytes, format_to_mime, ImageError, DEFAULT_MAX_DECODE_DIMENSION,
};
use super::types::Region;

/// Longest side kept before downscaling
pub const DEFAULT_MAX_DIMENSION: u32 = 4096;

/// Skew below this many degrees is left alone
pub const DEFAULT_SKEW_THRESHOLD_DEG: f32 = 2.0;

/// Candidate skew angles are searched in [-N, N] degrees
pub const DEFAULT_MAX_SKEW_SEARCH_DEG: f32 = 10.0;

/// Percentile spread below which an image counts as near-uniform
const MIN_CONTRAST_SPREAD: u8 = 16;

/// Ink pixels sampled for skew scoring
const SKEW_SAMPLE_LIMIT: usize = 150_000;

const SKEW_COARSE_STEP_DEG: f32 = 0.5;
const SKEW_FINE_STEP_DEG: f32 = 0.1;

/// Ink ratio bounds for a meaningful projection profile
const MIN_INK_RATIO: f32 = 0.002;
const MAX_INK_RATIO: f32 = 0.6;

const MIN_SKEW_DIMENSION: u32 = 32;

/// Fill value for pixels rotated in from outside the canvas
const BACKGROUND: u8 = 255;

/// Preprocessing parameters
#[derive(Debug, Clone)]
pub struct PreprocessConfig {
    pub max_dimension: u32,
    /// Uploads wider or taller than this are rejected undecoded
    pub max_decode_dimension: u32,
    pub skew_threshold_deg: f32,
    pub max_skew_search_deg: f32,
    pub normalize_contrast: bool,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_MAX_DIMENSION,
            max_decode_dimension: DEFAULT_MAX_DECODE_DIMENSION,
            skew_threshold_deg: DEFAULT_SKEW_THRESHOLD_DEG,
            max_skew_search_deg: DEFAULT_MAX_SKEW_SEARCH_DEG,
            normalize_contrast: true,
        }
    }
}

/// Normalized raster handed to the recognition engines
#[derive(Debug, Clone)]
pub struct PreprocessedImage {
    /// Contrast-normalized, deskewed grayscale
    pub gray: GrayImage,
    /// Otsu-binarized copy of `gray` (0 or 255)
    pub binary: GrayImage,
    /// `gray` dimensions divided by source dimensions
    pub scale: f32,
    /// Rotation applied to straighten the image, in degrees
    pub skew_corrected_deg: Option<f32>,
    /// Pivot of the deskew rotation, in `gray` pixels
    pub rotation_center: (f32, f32),
    /// Upright (EXIF-oriented) source dimensions
    pub source_width: u32,
    pub source_height: u32,
    /// Detected upload format, when decoded from bytes
    pub media_type: Option<&'static str>,
}

impl PreprocessedImage {
    pub fn width(&self) -> u32 {
        self.gray.width()
    }

    pub fn height(&self) -> u32 {
        self.gray.height()
    }

    /// Map a region in preprocessed pixels to source pixels, clipped to the
    /// source bounds.
    ///
    /// Undoes the deskew rotation first (the result is the bounding box of
    /// the rotated corners), then the downscale.
    pub fn to_source_region(&self, region: &Region) -> Option<Region> {
        let unrotated = match self.skew_corrected_deg {
            Some(angle) => self.unrotate(region, angle),
            None => *region,
        };
        unrotated
            .unscale(self.scale)
            .clamp_to(self.source_width, self.source_height)
    }

    /// Bounding box, in the pre-rotation frame, of a region of the image
    /// deskewed by `angle_deg` (same mapping as [`rotate_about_center`])
    fn unrotate(&self, region: &Region, angle_deg: f32) -> Region {
        let (s, c) = angle_deg.to_radians().sin_cos();
        let (cx, cy) = self.rotation_center;
        let (x0, y0) = (region.x as f32, region.y as f32);
        let (x1, y1) = (region.right() as f32, region.bottom() as f32);

        let (mut min_x, mut min_y) = (f32::MAX, f32::MAX);
        let (mut max_x, mut max_y) = (f32::MIN, f32::MIN);
        for (x, y) in [(x0, y0), (x1, y0), (x0, y1), (x1, y1)] {
            let (dx, dy) = (x - cx, y - cy);
            let sx = cx + dx * c - dy * s;
            let sy = cy + dx * s + dy * c;
            min_x = min_x.min(sx);
            min_y = min_y.min(sy);
            max_x = max_x.max(sx);
            max_y = max_y.max(sy);
        }
        Region::from_bounds(min_x, min_y, max_x, max_y)
    }
}

/// Decode `bytes` and run the full preprocessing chain
pub fn preprocess_bytes(
    bytes: &[u8],
    max_payload: usize,
    config: &PreprocessConfig,
) -> Result<PreprocessedImage, ImageError> {
    let (image, info) = decode_image_bytes(bytes, max_payload, config.max_decode_dimension)?;
    debug!(
        width = info.width,
        height = info.height,
        format = ?info.format,
        orientation = ?info.orientation,
        size_bytes = info.size_bytes,
        "Decoded image"
    );
    let mut preprocessed = preprocess_image(&image, config);
    preprocessed.media_type = Some(format_to_mime(info.format));
    Ok(preprocessed)
}

/// Run the preprocessing chain on an already decoded image
pub fn preprocess_image(image: &DynamicImage, config: &PreprocessConfig) -> PreprocessedImage {
    let source_width = image.width();
    let source_height = image.height();

    let (gray, scale) = downscale_to_fit(image.to_luma8(), config.max_dimension);

    let gray = if config.normalize_contrast {
        stretch_contrast(&gray)
    } else {
        gray
    };

    let mut skew_corrected_deg = None;
    let gray = match detect_skew_angle(&gray, config.max_skew_search_deg) {
        Some(angle) if angle.abs() > config.skew_threshold_deg => {
            debug!(angle, threshold = config.skew_threshold_deg, "Correcting skew");
            skew_corrected_deg = Some(angle);
            rotate_about_center(&gray, angle)
        }
        Some(angle) => {
            debug!(angle, "Skew within threshold, leaving image as is");
            gray
        }
        None => gray,
    };

    let threshold = otsu_threshold(&gray);
    let binary = binarize(&gray, threshold);
    let rotation_center = (
        (gray.width() as f32 - 1.0) / 2.0,
        (gray.height() as f32 - 1.0) / 2.0,
    );

    PreprocessedImage {
        gray,
        binary,
        scale,
        skew_corrected_deg,
        rotation_center,
        source_width,
        source_height,
        media_type: None,
    }
}

/// Shrink so the longest side is at most `max_dimension`.
///
/// Returns the image and the scale applied (1.0 when untouched).
pub fn downscale_to_fit(gray: GrayImage, max_dimension: u32) -> (GrayImage, f32) {
    let (w, h) = gray.dimensions();
    let longest = w.max(h);
    if max_dimension == 0 || longest <= max_dimension {
        return (gray, 1.0);
    }

    let scale = max_dimension as f32 / longest as f32;
    let new_w = ((w as f32 * scale).round() as u32).clamp(1, max_dimension);
    let new_h = ((h as f32 * scale).round() as u32).clamp(1, max_dimension);

    debug!(from_w = w, from_h = h, new_w, new_h, "Downscaling oversized image");
    let resized = image::imageops::resize(&gray, new_w, new_h, FilterType::Triangle);
    (resized, scale)
}

/// Enlarge by an integer factor (Lanczos3), used for small-text OCR passes
pub fn upscale(gray: &GrayImage, factor: u32) -> GrayImage {
    if factor <= 1 {
        return gray.clone();
    }
    let (w, h) = gray.dimensions();
    image::imageops::resize(gray, w * factor, h * factor, FilterType::Lanczos3)
}

fn histogram(gray: &GrayImage) -> [u64; 256] {
    let mut hist = [0u64; 256];
    for p in gray.pixels() {
        hist[p.0[0] as usize] += 1;
    }
    hist
}

fn percentile(hist: &[u64; 256], total: u64, fraction: f64) -> u8 {
    let target = ((total as f64) * fraction).ceil().max(1.0) as u64;
    let mut cumulative = 0u64;
    for (value, &count) in hist.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return value as u8;
        }
    }
    255
}

/// Linear stretch mapping the 1st..99th luminance percentiles to 0..255.
///
/// Near-uniform images (blank pages) are returned unchanged.
pub fn stretch_contrast(gray: &GrayImage) -> GrayImage {
    let total = gray.width() as u64 * gray.height() as u64;
    if total == 0 {
        return gray.clone();
    }

    let hist = histogram(gray);
    let lo = percentile(&hist, total, 0.01);
    let hi = percentile(&hist, total, 0.99);
    if hi <= lo || hi - lo < MIN_CONTRAST_SPREAD {
        return gray.clone();
    }

    let range = (hi - lo) as f32;
    let lut: [u8; 256] = std::array::from_fn(|v| {
        ((v as f32 - lo as f32) * 255.0 / range)
            .round()
            .clamp(0.0, 255.0) as u8
    });

    let mut out = gray.clone();
    for p in out.pixels_mut() {
        p.0[0] = lut[p.0[0] as usize];
    }
    out
}

/// Otsu's global threshold; pixels `<= threshold` are foreground (ink)
pub fn otsu_threshold(gray: &GrayImage) -> u8 {
    let hist = histogram(gray);
    let total: u64 = hist.iter().sum();
    if total == 0 {
        return 128;
    }

    let sum_all: f64 = hist
        .iter()
        .enumerate()
        .map(|(i, &n)| i as f64 * n as f64)
        .sum();

    let mut sum_background = 0.0f64;
    let mut weight_background = 0u64;
    let mut best_variance = -1.0f64;
    let mut threshold = 0u8;

    for (t, &count) in hist.iter().enumerate() {
        weight_background += count;
        if weight_background == 0 {
            continue;
        }
        let weight_foreground = total - weight_background;
        if weight_foreground == 0 {
            break;
        }

        sum_background += t as f64 * count as f64;
        let mean_b = sum_background / weight_background as f64;
        let mean_f = (sum_all - sum_background) / weight_foreground as f64;
        let between =
            weight_background as f64 * weight_foreground as f64 * (mean_b - mean_f).powi(2);

        if between > best_variance {
            best_variance = between;
            threshold = t as u8;
        }
    }

    threshold
}

/// Pixels `<= threshold` become 0, the rest 255
pub fn binarize(gray: &GrayImage, threshold: u8) -> GrayImage {
    let mut out = gray.clone();
    for p in out.pixels_mut() {
        p.0[0] = if p.0[0] <= threshold { 0 } else { 255 };
    }
    out
}

/// Estimate the rotation (degrees) that straightens text lines.
///
/// Projection-profile search: every candidate angle projects the ink pixels
/// onto rows of the image rotated by that angle, and the angle with the most
/// concentrated rows wins. Coarse search in 0.5° steps, refined in 0.1°
/// steps. Passing the result to [`rotate_about_center`] deskews the image.
///
/// Returns `None` when the image is too small or holds too little (or too
/// much) ink for a meaningful profile.
pub fn detect_skew_angle(gray: &GrayImage, max_search_deg: f32) -> Option<f32> {
    let (w, h) = gray.dimensions();
    if w < MIN_SKEW_DIMENSION || h < MIN_SKEW_DIMENSION || max_search_deg <= 0.0 {
        return None;
    }

    let threshold = otsu_threshold(gray);
    let ink_count = gray.pixels().filter(|p| p.0[0] <= threshold).count();
    let ink_ratio = ink_count as f32 / (w as f32 * h as f32);
    if !(MIN_INK_RATIO..=MAX_INK_RATIO).contains(&ink_ratio) {
        return None;
    }

    let stride = ink_count / SKEW_SAMPLE_LIMIT + 1;
    let cx = (w as f32 - 1.0) / 2.0;
    let cy = (h as f32 - 1.0) / 2.0;
    let points: Vec<(f32, f32)> = gray
        .enumerate_pixels()
        .filter(|(_, _, p)| p.0[0] <= threshold)
        .step_by(stride)
        .map(|(x, y, _)| (x as f32 - cx, y as f32 - cy))
        .collect();

    let diag = ((w as f32).hypot(h as f32)).ceil() as i64;
    let bins = (2 * diag + 1) as usize;

    let score = |angle_deg: f32| -> f64 {
        let (s, c) = angle_deg.to_radians().sin_cos();
        let mut rows = vec![0u32; bins];
        for &(dx, dy) in &points {
            let row = (-dx * s + dy * c).round() as i64 + diag;
            if row >= 0 && (row as usize) < bins {
                rows[row as usize] += 1;
            }
        }
        rows.iter().map(|&n| n as f64 * n as f64).sum()
    };

    // Upright first so ties prefer no rotation
    let mut best_angle = 0.0f32;
    let mut best_score = score(0.0);

    let steps = (max_search_deg / SKEW_COARSE_STEP_DEG).floor() as i32;
    for i in -steps..=steps {
        if i == 0 {
            continue;
        }
        let angle = i as f32 * SKEW_COARSE_STEP_DEG;
        let s = score(angle);
        if s > best_score {
            best_score = s;
            best_angle = angle;
        }
    }

    let coarse = best_angle;
    for i in -4..=4 {
        if i == 0 {
            continue;
        }
        let angle = coarse + i as f32 * SKEW_FINE_STEP_DEG;
        if angle.abs() > max_search_deg {
            continue;
        }
        let s = score(angle);
        if s > best_score {
            best_score = s;
            best_angle = angle;
        }
    }

    Some((best_angle * 10.0).round() / 10.0)
}

/// Rotate about the image center, keeping the canvas size.
///
/// Output pixel `p` samples the source at `R(angle) * (p - c) + c`
/// (bilinear); pixels falling outside the source are filled white.
pub fn rotate_about_center(gray: &GrayImage, angle_deg: f32) -> GrayImage {
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 || angle_deg == 0.0 {
        return gray.clone();
    }

    let (s, c) = angle_deg.to_radians().sin_cos();
    let cx = (w as f32 - 1.0) / 2.0;
    let cy = (h as f32 - 1.0) / 2.0;

    let mut out = GrayImage::from_pixel(w, h, Luma([BACKGROUND]));
    for y in 0..h {
        for x in 0..w {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            let sx = cx + dx * c - dy * s;
            let sy = cy + dx * s + dy * c;
            if let Some(v) = sample_bilinear(gray, sx, sy) {
                out.put_pixel(x, y, Luma([v]));
            }
        }
    }
    out
}

fn sample_bilinear(img: &GrayImage, x: f32, y: f32) -> Option<u8> {
    let (w, h) = img.dimensions();
    if x < 0.0 || y < 0.0 || x > (w - 1) as f32 || y > (h - 1) as f32 {
        return None;
    }

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p = |px: u32, py: u32| img.get_pixel(px, py).0[0] as f32;
    let top = p(x0, y0) * (1.0 - fx) + p(x1, y0) * fx;
    let bottom = p(x0, y1) * (1.0 - fx) + p(x1, y1) * fx;
    Some((top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8)
}
