// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Recognition engine: OCR and symbol decoding over a preprocessed image
//!
//! Runs the engines selected by the request mode, maps every detection back
//! to source-image pixels, resolves overlapping detections by confidence and
//! returns items in reading order.

pub mod symbol;
pub mod text;

use image::GrayImage;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::vision::preprocessing::{upscale, PreprocessedImage};
use crate::vision::types::{sanitize_confidence, ExtractedItem, RecognitionMode};

pub use symbol::{symbology_matches, DecodedSymbol, RxingDecoder, SymbolDecoder};
#[cfg(feature = "tesseract")]
pub use text::TesseractRecognizer;
pub use text::{MockTextRecognizer, TextLine, TextRecognizer};

/// Default IoU above which two detections are considered the same
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.5;

/// Images whose longest side is below this get an extra 2x OCR pass
pub const UPSCALE_BELOW_PX: u32 = 1200;

const UPSCALE_FACTOR: u32 = 2;

/// Errors raised by a recognition engine
#[derive(Debug, Clone, Error)]
pub enum RecognitionError {
    #[error("{engine} recognition unavailable: {reason}")]
    EngineUnavailable { engine: &'static str, reason: String },

    #[error("{engine} recognition failed: {reason}")]
    EngineFailed { engine: &'static str, reason: String },
}

impl RecognitionError {
    pub fn unavailable(engine: &'static str, reason: impl Into<String>) -> Self {
        Self::EngineUnavailable {
            engine,
            reason: reason.into(),
        }
    }

    pub fn failed(engine: &'static str, reason: impl Into<String>) -> Self {
        Self::EngineFailed {
            engine,
            reason: reason.into(),
        }
    }
}

/// Tuning shared by every request
#[derive(Debug, Clone)]
pub struct RecognitionSettings {
    pub iou_threshold: f32,
    /// Text lines below this confidence are dropped
    pub min_text_confidence: f32,
    /// Add a 2x upscaled OCR pass for small images
    pub upscale_small_images: bool,
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        Self {
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            min_text_confidence: 0.0,
            upscale_small_images: true,
        }
    }
}

/// Per-request recognition parameters
#[derive(Debug, Clone)]
pub struct RecognitionRequest {
    pub mode: RecognitionMode,
    pub language: String,
    pub symbology: Option<String>,
}

/// Merged detections plus the reasons any engine was skipped
#[derive(Debug, Clone, Default)]
pub struct RecognitionOutput {
    pub items: Vec<ExtractedItem>,
    /// Non-empty when one engine of an `auto` request failed or was unavailable
    pub warnings: Vec<String>,
}

impl RecognitionOutput {
    pub fn is_partial(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// The configured engines. Cheap to clone; engines are shared.
#[derive(Clone)]
pub struct RecognitionEngine {
    text: Option<Arc<dyn TextRecognizer>>,
    symbols: Option<Arc<dyn SymbolDecoder>>,
    settings: RecognitionSettings,
}

impl std::fmt::Debug for RecognitionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecognitionEngine")
            .field("text", &self.text_engine_name())
            .field("symbols", &self.symbol_engine_name())
            .field("settings", &self.settings)
            .finish()
    }
}

impl RecognitionEngine {
    pub fn new(
        text: Option<Arc<dyn TextRecognizer>>,
        symbols: Option<Arc<dyn SymbolDecoder>>,
        settings: RecognitionSettings,
    ) -> Self {
        Self {
            text,
            symbols,
            settings,
        }
    }

    pub fn text_engine_name(&self) -> Option<&'static str> {
        self.text.as_ref().map(|t| t.name())
    }

    pub fn symbol_engine_name(&self) -> Option<&'static str> {
        self.symbols.as_ref().map(|s| s.name())
    }

    pub fn settings(&self) -> &RecognitionSettings {
        &self.settings
    }

    /// Run the engines the request mode selects and merge their results.
    ///
    /// Single-engine modes propagate that engine's error. In `auto` mode an
    /// engine error becomes a warning as long as the other engine succeeded,
    /// and an engine that is not installed at all is skipped without one
    /// (`/health` reports it instead).
    pub fn recognize(
        &self,
        image: &PreprocessedImage,
        request: &RecognitionRequest,
    ) -> Result<RecognitionOutput, RecognitionError> {
        let skip_missing = request.mode == RecognitionMode::Auto
            && (self.text.is_some() || self.symbols.is_some());

        let mut outcomes = Vec::with_capacity(2);
        if request.mode.wants_text() && !(skip_missing && self.text.is_none()) {
            outcomes.push(self.recognize_text(image, &request.language));
        }
        if request.mode.wants_symbols() && !(skip_missing && self.symbols.is_none()) {
            outcomes.push(self.decode_symbols(image, request.symbology.as_deref()));
        }

        let mut items = Vec::new();
        let mut errors = Vec::new();
        let mut succeeded = 0usize;
        for outcome in outcomes {
            match outcome {
                Ok(found) => {
                    succeeded += 1;
                    items.extend(found);
                }
                Err(e) => errors.push(e),
            }
        }

        if succeeded == 0 {
            // Prefer a real failure over an absent engine
            let pick = errors
                .iter()
                .position(|e| matches!(e, RecognitionError::EngineFailed { .. }))
                .unwrap_or(0);
            if pick < errors.len() {
                return Err(errors.swap_remove(pick));
            }
            return Ok(RecognitionOutput::default());
        }

        let warnings: Vec<String> = errors
            .iter()
            .map(|e| {
                warn!(error = %e, "Returning partial results");
                e.to_string()
            })
            .collect();

        let candidates = items.len();
        let mut items = suppress_overlaps(items, self.settings.iou_threshold);
        sort_reading_order(&mut items);
        debug!(
            candidates,
            kept = items.len(),
            mode = %request.mode,
            "Recognition merged"
        );

        Ok(RecognitionOutput { items, warnings })
    }

    fn recognize_text(
        &self,
        image: &PreprocessedImage,
        language: &str,
    ) -> Result<Vec<ExtractedItem>, RecognitionError> {
        let recognizer = self
            .text
            .as_ref()
            .ok_or_else(|| RecognitionError::unavailable("text", "no OCR engine configured"))?;

        let upscaled = (self.settings.upscale_small_images
            && image.width().max(image.height()) < UPSCALE_BELOW_PX)
            .then(|| upscale(&image.gray, UPSCALE_FACTOR));

        let mut passes: Vec<(&GrayImage, f32)> = vec![(&image.gray, 1.0), (&image.binary, 1.0)];
        if let Some(up) = upscaled.as_ref() {
            passes.push((up, UPSCALE_FACTOR as f32));
        }

        let mut items = Vec::new();
        for (pass_image, factor) in passes {
            let lines = recognizer.recognize(pass_image, language)?;
            debug!(
                engine = recognizer.name(),
                factor,
                lines = lines.len(),
                "OCR pass complete"
            );

            for line in lines {
                let content = line.text.trim();
                if content.is_empty() {
                    continue;
                }
                let confidence = sanitize_confidence(line.confidence);
                if confidence < self.settings.min_text_confidence {
                    continue;
                }
                let Some(region) = image.to_source_region(&line.region.unscale(factor)) else {
                    continue;
                };
                items.push(ExtractedItem::text(content, confidence, region));
            }
        }

        Ok(items)
    }

    fn decode_symbols(
        &self,
        image: &PreprocessedImage,
        symbology: Option<&str>,
    ) -> Result<Vec<ExtractedItem>, RecognitionError> {
        let decoder = self
            .symbols
            .as_ref()
            .ok_or_else(|| RecognitionError::unavailable("symbol", "no symbol decoder configured"))?;

        let mut found = decoder.decode(&image.gray)?;
        if found.is_empty() {
            found = decoder.decode(&image.binary)?;
        }
        debug!(engine = decoder.name(), symbols = found.len(), "Symbol decoding complete");

        Ok(found
            .into_iter()
            .filter(|s| symbology.map_or(true, |f| symbology_matches(&s.symbology, f)))
            .filter_map(|s| {
                let region = image.to_source_region(&s.region)?;
                Some(ExtractedItem::symbol(s.payload, s.symbology, region))
            })
            .collect())
    }
}

/// Greedy non-maximum suppression across all items.
///
/// Items are visited by descending confidence (stable, so the earlier item
/// wins a tie); an item is dropped when its IoU with an already kept item
/// exceeds `iou_threshold`.
pub fn suppress_overlaps(mut items: Vec<ExtractedItem>, iou_threshold: f32) -> Vec<ExtractedItem> {
    items.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<ExtractedItem> = Vec::with_capacity(items.len());
    for item in items {
        if kept
            .iter()
            .all(|k| k.region.iou(&item.region) <= iou_threshold)
        {
            kept.push(item);
        }
    }
    kept
}

/// Top-to-bottom, then left-to-right
pub fn sort_reading_order(items: &mut [ExtractedItem]) {
    items.sort_by(|a, b| {
        a.region
            .y
            .cmp(&b.region.y)
            .then(a.region.x.cmp(&b.region.x))
            .then_with(|| a.content.cmp(&b.content))
    });
}
