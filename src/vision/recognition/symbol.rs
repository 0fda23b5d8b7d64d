// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Barcode and QR decoding

use image::GrayImage;
use rxing::{BarcodeFormat, Exceptions};
use tracing::debug;

use super::RecognitionError;
use crate::vision::types::Region;

/// One decoded symbol, coordinates in the pixels of the decoded image
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSymbol {
    pub payload: String,
    /// zbar-style name, e.g. "QRCODE", "EAN13"
    pub symbology: String,
    pub region: Region,
}

/// Symbol decoding backend
pub trait SymbolDecoder: Send + Sync {
    fn name(&self) -> &'static str;

    /// Decode every symbol found in `image`
    fn decode(&self, image: &GrayImage) -> Result<Vec<DecodedSymbol>, RecognitionError>;
}

/// Pure Rust decoder covering QR, DataMatrix, Aztec, PDF417 and 1D retail codes
#[derive(Debug, Default, Clone)]
pub struct RxingDecoder;

impl RxingDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl SymbolDecoder for RxingDecoder {
    fn name(&self) -> &'static str {
        "rxing"
    }

    fn decode(&self, image: &GrayImage) -> Result<Vec<DecodedSymbol>, RecognitionError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Ok(Vec::new());
        }

        let results =
            match rxing::helpers::detect_multiple_in_luma(image.as_raw().clone(), width, height) {
                Ok(results) => results,
                Err(e) => {
                    classify_decode_error(e)?;
                    return Ok(Vec::new());
                }
            };

        let mut symbols: Vec<DecodedSymbol> = Vec::with_capacity(results.len());
        for r in results.iter().filter(|r| !r.getText().is_empty()) {
            let symbology = symbology_name(r.getBarcodeFormat());
            // The multi-reader can report one symbol from overlapping sub-scans
            if symbols
                .iter()
                .any(|s| s.payload == r.getText() && s.symbology == symbology)
            {
                continue;
            }
            let points: Vec<(f32, f32)> = r.getPoints().iter().map(|p| (p.x, p.y)).collect();
            symbols.push(DecodedSymbol {
                payload: r.getText().to_string(),
                symbology,
                region: region_from_points(&points, width, height),
            });
        }

        Ok(symbols)
    }
}

/// Decoder errors that only mean "no readable symbol" are `Ok`; anything
/// else is an engine failure
fn classify_decode_error(err: Exceptions) -> Result<(), RecognitionError> {
    match err {
        Exceptions::NotFoundException(_) => Ok(()),
        Exceptions::ChecksumException(_)
        | Exceptions::FormatException(_)
        | Exceptions::ReedSolomonException(_) => {
            debug!(error = ?err, "Symbol decoding found no readable symbol");
            Ok(())
        }
        other => Err(RecognitionError::failed("symbol", format!("{other:?}"))),
    }
}

/// zbar-style symbology names
pub fn symbology_name(format: &BarcodeFormat) -> String {
    match format {
        BarcodeFormat::QR_CODE => "QRCODE".to_string(),
        BarcodeFormat::EAN_13 => "EAN13".to_string(),
        BarcodeFormat::EAN_8 => "EAN8".to_string(),
        BarcodeFormat::UPC_A => "UPCA".to_string(),
        BarcodeFormat::UPC_E => "UPCE".to_string(),
        BarcodeFormat::CODE_128 => "CODE128".to_string(),
        BarcodeFormat::CODE_39 => "CODE39".to_string(),
        BarcodeFormat::CODE_93 => "CODE93".to_string(),
        BarcodeFormat::CODABAR => "CODABAR".to_string(),
        BarcodeFormat::ITF => "I25".to_string(),
        BarcodeFormat::DATA_MATRIX => "DATAMATRIX".to_string(),
        BarcodeFormat::PDF_417 => "PDF417".to_string(),
        BarcodeFormat::AZTEC => "AZTEC".to_string(),
        BarcodeFormat::RSS_14 => "DATABAR".to_string(),
        BarcodeFormat::RSS_EXPANDED => "DATABAR_EXP".to_string(),
        other => format!("{other:?}").replace('_', ""),
    }
}

/// Normalize a client symbology filter for comparison: uppercase, alphanumerics only
pub fn normalize_symbology(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// True when `symbology` satisfies `filter` ("QR" matches "QRCODE",
/// "EAN" matches both EAN widths)
pub fn symbology_matches(symbology: &str, filter: &str) -> bool {
    let filter = normalize_symbology(filter);
    !filter.is_empty() && normalize_symbology(symbology).starts_with(&filter)
}

/// Bounding box of the result points.
///
/// Finder-pattern centres and scan-line ends sit inside the symbol, so the
/// box is padded and clipped to the image.
fn region_from_points(points: &[(f32, f32)], width: u32, height: u32) -> Region {
    if points.is_empty() {
        return Region::new(0, 0, width, height);
    }

    let (mut min_x, mut min_y) = (f32::MAX, f32::MAX);
    let (mut max_x, mut max_y) = (f32::MIN, f32::MIN);
    for &(x, y) in points {
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
    }

    let pad = ((max_x - min_x).max(max_y - min_y) * 0.1).max(2.0);
    let region = Region::from_bounds(min_x - pad, min_y - pad, max_x + pad, max_y + pad);
    region
        .clamp_to(width, height)
        .unwrap_or_else(|| Region::new(0, 0, width, height))
}
