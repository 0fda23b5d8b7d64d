// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Text recognition (OCR)
//!
//! Engines return line-level results: Tesseract word boxes from the TSV
//! output are grouped by (page, block, paragraph, line).

use image::GrayImage;
use std::collections::BTreeMap;

use super::RecognitionError;
use crate::vision::types::Region;

/// One recognized line of text, coordinates in the pixels of the image
/// handed to the engine
#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    pub text: String,
    /// Mean word confidence in [0, 1]
    pub confidence: f32,
    pub region: Region,
}

/// OCR backend
///
/// Implementations are called from blocking worker threads and may be slow.
pub trait TextRecognizer: Send + Sync {
    /// Engine name for logs and health output
    fn name(&self) -> &'static str;

    /// Recognize lines of text in `image` using `language`
    /// (Tesseract style, e.g. "eng" or "eng+deu")
    fn recognize(&self, image: &GrayImage, language: &str)
        -> Result<Vec<TextLine>, RecognitionError>;
}

/// Tesseract-backed recognizer. A fresh API handle is created per call so
/// the recognizer itself can be shared across workers.
#[cfg(feature = "tesseract")]
pub struct TesseractRecognizer {
    tessdata_dir: Option<String>,
}

#[cfg(feature = "tesseract")]
impl TesseractRecognizer {
    /// Probe `language` once so a missing install is reported at startup
    pub fn new(
        tessdata_dir: Option<&std::path::Path>,
        language: &str,
    ) -> Result<Self, RecognitionError> {
        let tessdata_dir = match tessdata_dir {
            Some(dir) => Some(
                dir.to_str()
                    .ok_or_else(|| RecognitionError::unavailable("text", "invalid tessdata path"))?
                    .to_string(),
            ),
            None => None,
        };

        tesseract::Tesseract::new(tessdata_dir.as_deref(), Some(language))
            .map_err(|e| RecognitionError::unavailable("text", format!("{e:?}")))?;

        tracing::info!(
            tessdata = ?tessdata_dir,
            language,
            "Tesseract initialized"
        );

        Ok(Self { tessdata_dir })
    }
}

#[cfg(feature = "tesseract")]
impl TextRecognizer for TesseractRecognizer {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    fn recognize(
        &self,
        image: &GrayImage,
        language: &str,
    ) -> Result<Vec<TextLine>, RecognitionError> {
        let png = crate::vision::image_utils::encode_png(image)
            .map_err(|e| RecognitionError::failed("text", e.to_string()))?;

        let tess = tesseract::Tesseract::new(self.tessdata_dir.as_deref(), Some(language))
            .map_err(|e| RecognitionError::unavailable("text", format!("{e:?}")))?;

        let mut tess = tess
            .set_image_from_mem(&png)
            .map_err(|e| RecognitionError::failed("text", format!("{e:?}")))?;

        let tsv = tess
            .get_tsv_text(0)
            .map_err(|e| RecognitionError::failed("text", format!("{e:?}")))?;

        Ok(parse_tsv_lines(&tsv))
    }
}

/// Accumulates the words of one line
#[derive(Default)]
struct LineAccumulator {
    words: Vec<String>,
    confidences: Vec<f32>,
    region: Option<Region>,
}

/// Group Tesseract TSV word rows (level 5) into lines.
///
/// TSV columns: level page block par line word left top width height conf text.
/// Words with confidence -1 contribute text and area but not confidence.
pub fn parse_tsv_lines(tsv: &str) -> Vec<TextLine> {
    let mut lines: BTreeMap<(u32, u32, u32, u32), LineAccumulator> = BTreeMap::new();

    for row in tsv.lines() {
        let fields: Vec<&str> = row.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }
        if fields[0].trim().parse::<i32>().ok() != Some(5) {
            continue;
        }

        let word = fields[11].trim();
        if word.is_empty() {
            continue;
        }

        let key = match (
            fields[1].parse::<u32>(),
            fields[2].parse::<u32>(),
            fields[3].parse::<u32>(),
            fields[4].parse::<u32>(),
        ) {
            (Ok(page), Ok(block), Ok(par), Ok(line)) => (page, block, par, line),
            _ => continue,
        };

        let region = match (
            fields[6].parse::<u32>(),
            fields[7].parse::<u32>(),
            fields[8].parse::<u32>(),
            fields[9].parse::<u32>(),
        ) {
            (Ok(x), Ok(y), Ok(w), Ok(h)) if w > 0 && h > 0 => Region::new(x, y, w, h),
            _ => continue,
        };

        let conf: f32 = fields[10].trim().parse().unwrap_or(-1.0);

        let acc = lines.entry(key).or_default();
        acc.words.push(word.to_string());
        if conf >= 0.0 {
            acc.confidences.push(conf / 100.0);
        }
        acc.region = Some(match acc.region {
            Some(r) => r.union(&region),
            None => region,
        });
    }

    lines
        .into_values()
        .filter_map(|acc| {
            let region = acc.region?;
            let confidence = if acc.confidences.is_empty() {
                0.0
            } else {
                acc.confidences.iter().sum::<f32>() / acc.confidences.len() as f32
            };
            Some(TextLine {
                text: acc.words.join(" "),
                confidence: confidence.clamp(0.0, 1.0),
                region,
            })
        })
        .collect()
}

/// Canned recognizer for tests and local development
pub struct MockTextRecognizer {
    lines: Vec<TextLine>,
    /// Image size the line regions refer to; regions follow resized inputs
    frame: Option<(u32, u32)>,
    delay: Option<std::time::Duration>,
    failure: Option<String>,
}

impl MockTextRecognizer {
    pub fn new(lines: Vec<TextLine>) -> Self {
        Self {
            lines,
            frame: None,
            delay: None,
            failure: None,
        }
    }

    /// One line covering `region`
    pub fn single(text: &str, confidence: f32, region: Region) -> Self {
        Self::new(vec![TextLine {
            text: text.to_string(),
            confidence,
            region,
        }])
    }

    /// Interpret line regions relative to a `width x height` image and
    /// rescale them to whatever image is recognized
    pub fn with_frame(mut self, width: u32, height: u32) -> Self {
        self.frame = Some((width.max(1), height.max(1)));
        self
    }

    /// Sleep this long inside every call
    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every call with `reason`
    pub fn failing(reason: &str) -> Self {
        Self {
            lines: Vec::new(),
            frame: None,
            delay: None,
            failure: Some(reason.to_string()),
        }
    }
}

impl TextRecognizer for MockTextRecognizer {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn recognize(
        &self,
        image: &GrayImage,
        _language: &str,
    ) -> Result<Vec<TextLine>, RecognitionError> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if let Some(reason) = &self.failure {
            return Err(RecognitionError::failed("text", reason.clone()));
        }
        let (width, height) = image.dimensions();
        Ok(self
            .lines
            .iter()
            .map(|line| match self.frame {
                Some((fw, fh)) => {
                    let sx = width as f32 / fw as f32;
                    let sy = height as f32 / fh as f32;
                    let r = line.region;
                    TextLine {
                        region: Region::from_bounds(
                            r.x as f32 * sx,
                            r.y as f32 * sy,
                            r.right() as f32 * sx,
                            r.bottom() as f32 * sy,
                        ),
                        ..line.clone()
                    }
                }
                None => line.clone(),
            })
            // Only report lines that fit the image it was given
            .filter(|line| line.region.fits_within(width, height))
            .collect())
    }
}
