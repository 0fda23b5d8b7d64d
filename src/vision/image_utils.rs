// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Payload validation and image decoding for uploaded images

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::metadata::Orientation;
use image::{DynamicImage, GrayImage, ImageDecoder, ImageFormat, ImageReader, Limits};
use std::io::Cursor;
use thiserror::Error;

/// Default maximum image payload (10MB)
pub const DEFAULT_MAX_IMAGE_SIZE: usize = 10 * 1024 * 1024;

/// Widest or tallest image the decoder will allocate for
pub const DEFAULT_MAX_DECODE_DIMENSION: u32 = 10_000;

/// Cap on decoder allocations (512MB)
pub const DEFAULT_MAX_DECODE_ALLOC: u64 = 512 * 1024 * 1024;

/// Declared MIME types accepted at ingress
pub const SUPPORTED_MEDIA_TYPES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/jpg",
    "image/gif",
    "image/webp",
    "image/bmp",
    "image/tiff",
    "application/octet-stream",
];

/// Errors raised while validating or decoding an uploaded image
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Image data is too large: {0} bytes (max: {1} bytes)")]
    TooLarge(usize, usize),

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Invalid base64 encoding: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("Unrecognized image format")]
    UnsupportedFormat,

    #[error("Failed to decode image: {0}")]
    DecodeFailed(String),

    #[error("Image dimensions exceed decode limits: {0}")]
    DimensionsTooLarge(String),

    #[error("Image data is empty")]
    EmptyData,

    #[error("Failed to encode image: {0}")]
    EncodeFailed(String),
}

/// Image information extracted during loading
#[derive(Debug, Clone)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    /// Format detected from magic bytes
    pub format: ImageFormat,
    pub size_bytes: usize,
    /// EXIF orientation applied while decoding
    pub orientation: Orientation,
}

/// Reject payloads over `max_size`; a payload of exactly `max_size` passes
pub fn check_payload_size(len: usize, max_size: usize) -> Result<(), ImageError> {
    if len > max_size {
        return Err(ImageError::TooLarge(len, max_size));
    }
    Ok(())
}

/// Check a declared `Content-Type` against the supported list.
///
/// Parameters such as `; charset=...` are ignored and matching is
/// case-insensitive.
pub fn check_media_type(content_type: &str) -> Result<(), ImageError> {
    let essence = media_type_essence(content_type);
    if SUPPORTED_MEDIA_TYPES.contains(&essence.as_str()) {
        Ok(())
    } else {
        Err(ImageError::UnsupportedMediaType(content_type.to_string()))
    }
}

/// `"Image/PNG; q=1"` -> `"image/png"`
pub fn media_type_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Decode a base64 payload (a `data:` URL prefix is tolerated)
pub fn decode_base64_payload(base64_str: &str) -> Result<Vec<u8>, ImageError> {
    let trimmed = base64_str.trim();
    if trimmed.is_empty() {
        return Err(ImageError::EmptyData);
    }

    let data = match trimmed.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => trimmed,
    };

    Ok(STANDARD.decode(data)?)
}

/// Decode raw image bytes, enforcing `max_size` on the payload and
/// `max_dimension` on either side of the raster.
///
/// The dimension check runs on the header, before pixels are allocated.
/// EXIF orientation is applied, so the returned image and `ImageInfo`
/// dimensions are upright.
pub fn decode_image_bytes(
    bytes: &[u8],
    max_size: usize,
    max_dimension: u32,
) -> Result<(DynamicImage, ImageInfo), ImageError> {
    check_payload_size(bytes.len(), max_size)?;

    if bytes.is_empty() {
        return Err(ImageError::EmptyData);
    }

    // Detect format from magic bytes
    let format = detect_format(bytes)?;

    let mut limits = Limits::default();
    limits.max_image_width = Some(max_dimension);
    limits.max_image_height = Some(max_dimension);
    limits.max_alloc = Some(DEFAULT_MAX_DECODE_ALLOC);

    let mut reader = ImageReader::with_format(Cursor::new(bytes), format);
    reader.limits(limits);
    let mut decoder = reader.into_decoder().map_err(decode_error)?;

    // Unreadable metadata leaves the image as stored
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let mut img = DynamicImage::from_decoder(decoder).map_err(decode_error)?;
    img.apply_orientation(orientation);

    let info = ImageInfo {
        width: img.width(),
        height: img.height(),
        format,
        size_bytes: bytes.len(),
        orientation,
    };

    Ok((img, info))
}

fn decode_error(err: image::ImageError) -> ImageError {
    match err {
        image::ImageError::Limits(e) => ImageError::DimensionsTooLarge(e.to_string()),
        other => ImageError::DecodeFailed(other.to_string()),
    }
}

/// Detect image format from magic bytes
pub fn detect_format(bytes: &[u8]) -> Result<ImageFormat, ImageError> {
    if bytes.len() < 4 {
        return Err(ImageError::UnsupportedFormat);
    }

    match bytes {
        // PNG: 89 50 4E 47 (0x89 P N G)
        [0x89, 0x50, 0x4E, 0x47, ..] => Ok(ImageFormat::Png),

        // JPEG: FF D8 FF
        [0xFF, 0xD8, 0xFF, ..] => Ok(ImageFormat::Jpeg),

        // WebP: RIFF .... WEBP
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => Ok(ImageFormat::WebP),

        // GIF: GIF87a or GIF89a
        [0x47, 0x49, 0x46, 0x38, x, ..] if *x == 0x37 || *x == 0x39 => Ok(ImageFormat::Gif),

        // BMP: BM
        [0x42, 0x4D, ..] => Ok(ImageFormat::Bmp),

        // TIFF: II (little-endian) or MM (big-endian)
        [0x49, 0x49, 0x2A, 0x00, ..] | [0x4D, 0x4D, 0x00, 0x2A, ..] => Ok(ImageFormat::Tiff),

        _ => Err(ImageError::UnsupportedFormat),
    }
}

/// Encode a grayscale raster as PNG in memory
pub fn encode_png(gray: &GrayImage) -> Result<Vec<u8>, ImageError> {
    let mut buf = Cursor::new(Vec::new());
    gray.write_to(&mut buf, ImageFormat::Png)
        .map_err(|e| ImageError::EncodeFailed(e.to_string()))?;
    Ok(buf.into_inner())
}

/// MIME type for a detected format
pub fn format_to_mime(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "image/png",
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::WebP => "image/webp",
        ImageFormat::Gif => "image/gif",
        ImageFormat::Bmp => "image/bmp",
        ImageFormat::Tiff => "image/tiff",
        _ => "application/octet-stream",
    }
}
