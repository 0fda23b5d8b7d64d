// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Shared recognition types: regions, extracted items, modes and hints

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which engines a request runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecognitionMode {
    /// OCR only
    Text,
    /// Barcode/QR decoding only
    Symbol,
    /// Both engines, results merged
    Auto,
}

impl RecognitionMode {
    pub fn wants_text(&self) -> bool {
        matches!(self, RecognitionMode::Text | RecognitionMode::Auto)
    }

    pub fn wants_symbols(&self) -> bool {
        matches!(self, RecognitionMode::Symbol | RecognitionMode::Auto)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecognitionMode::Text => "text",
            RecognitionMode::Symbol => "symbol",
            RecognitionMode::Auto => "auto",
        }
    }
}

impl fmt::Display for RecognitionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecognitionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" | "ocr" => Ok(RecognitionMode::Text),
            "symbol" | "barcode" | "qr" => Ok(RecognitionMode::Symbol),
            "auto" | "both" => Ok(RecognitionMode::Auto),
            other => Err(format!(
                "unsupported mode '{}', supported: text, symbol, auto",
                other
            )),
        }
    }
}

/// Axis-aligned rectangle in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Smallest region covering the given corner coordinates (exclusive max)
    pub fn from_bounds(min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Self {
        let x0 = min_x.max(0.0).floor() as u32;
        let y0 = min_y.max(0.0).floor() as u32;
        let x1 = max_x.max(0.0).ceil() as u32;
        let y1 = max_y.max(0.0).ceil() as u32;
        Self {
            x: x0,
            y: y0,
            width: x1.saturating_sub(x0).max(1),
            height: y1.saturating_sub(y0).max(1),
        }
    }

    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Smallest region containing both
    pub fn union(&self, other: &Region) -> Region {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Region {
            x,
            y,
            width: self.right().max(other.right()) - x,
            height: self.bottom().max(other.bottom()) - y,
        }
    }

    /// Intersection-over-union, 0.0 when disjoint
    pub fn iou(&self, other: &Region) -> f32 {
        let x_min = self.x.max(other.x);
        let y_min = self.y.max(other.y);
        let x_max = self.right().min(other.right());
        let y_max = self.bottom().min(other.bottom());

        if x_max <= x_min || y_max <= y_min {
            return 0.0;
        }

        let intersection = (x_max - x_min) as u64 * (y_max - y_min) as u64;
        let union = self.area() + other.area() - intersection;

        if union > 0 {
            intersection as f32 / union as f32
        } else {
            0.0
        }
    }

    /// Map from a space scaled by `scale` back to the unscaled space
    pub fn unscale(&self, scale: f32) -> Region {
        if !scale.is_finite() || scale <= 0.0 || (scale - 1.0).abs() < f32::EPSILON {
            return *self;
        }
        Region::from_bounds(
            self.x as f32 / scale,
            self.y as f32 / scale,
            self.right() as f32 / scale,
            self.bottom() as f32 / scale,
        )
    }

    /// Clip to `width x height`; `None` when nothing remains
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Region> {
        if self.x >= width || self.y >= height {
            return None;
        }
        let right = self.right().min(width);
        let bottom = self.bottom().min(height);
        if right <= self.x || bottom <= self.y {
            return None;
        }
        Some(Region {
            x: self.x,
            y: self.y,
            width: right - self.x,
            height: bottom - self.y,
        })
    }

    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.width > 0 && self.height > 0 && self.right() <= width && self.bottom() <= height
    }

    /// `[x, y, w, h]` as used on the wire
    pub fn to_array(&self) -> [u32; 4] {
        [self.x, self.y, self.width, self.height]
    }
}

/// Which engine produced an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Text,
    Symbol,
}

/// One detection: text line or decoded symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedItem {
    /// Recognized text or symbol payload
    pub content: String,
    /// Confidence in [0, 1]
    pub confidence: f32,
    /// Location in source-image pixels
    pub region: Region,
    pub kind: ItemKind,
    /// Symbology name for symbol items (e.g. "QRCODE", "EAN13")
    pub symbology: Option<String>,
}

impl ExtractedItem {
    pub fn text(content: impl Into<String>, confidence: f32, region: Region) -> Self {
        Self {
            content: content.into(),
            confidence: sanitize_confidence(confidence),
            region,
            kind: ItemKind::Text,
            symbology: None,
        }
    }

    pub fn symbol(
        content: impl Into<String>,
        symbology: impl Into<String>,
        region: Region,
    ) -> Self {
        Self {
            content: content.into(),
            confidence: 1.0,
            region,
            kind: ItemKind::Symbol,
            symbology: Some(symbology.into()),
        }
    }
}

/// Ordered detections for one image, in reading order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub items: Vec<ExtractedItem>,
}

impl ExtractionResult {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// All text items joined line by line
    pub fn full_text(&self) -> String {
        self.items
            .iter()
            .filter(|item| item.kind == ItemKind::Text)
            .map(|item| item.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// First decoded symbol, if any
    pub fn first_symbol(&self) -> Option<&ExtractedItem> {
        self.items.iter().find(|item| item.kind == ItemKind::Symbol)
    }
}

/// Client-supplied hints attached to an image
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionHints {
    /// Overrides the configured default mode
    pub mode: Option<RecognitionMode>,
    /// Tesseract language spec, e.g. "eng" or "eng+deu"
    pub language: Option<String>,
    /// Keep only symbols of this symbology (zbar-style name)
    pub symbology: Option<String>,
}

/// An uploaded image as received at ingress
#[derive(Debug, Clone)]
pub struct ImageInput {
    pub bytes: Bytes,
    /// Declared `Content-Type`, if the transport carried one
    pub media_type: Option<String>,
    pub hints: RecognitionHints,
}

impl ImageInput {
    pub fn new(bytes: impl Into<Bytes>, media_type: Option<String>) -> Self {
        Self {
            bytes: bytes.into(),
            media_type,
            hints: RecognitionHints::default(),
        }
    }

    pub fn with_hints(mut self, hints: RecognitionHints) -> Self {
        self.hints = hints;
        self
    }
}

/// Clamp to [0, 1]; NaN and infinities become 0
pub fn sanitize_confidence(confidence: f32) -> f32 {
    if confidence.is_finite() {
        confidence.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
