// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Vision processing: image decoding, preprocessing and recognition
//!
//! This module provides:
//! - Payload validation and decoding (`image_utils`)
//! - Grayscale normalization, deskew and binarization (`preprocessing`)
//! - OCR and barcode/QR decoding with overlap resolution (`recognition`)
//! - The bounded worker pool and the request pipeline tying them together

pub mod image_utils;
pub mod pipeline;
pub mod pool;
pub mod preprocessing;
pub mod recognition;
pub mod types;

pub use image_utils::{decode_base64_payload, decode_image_bytes, detect_format, ImageError, ImageInfo};
pub use pipeline::{ExtractionPipeline, PipelineConfig, PipelineOutput, RecognitionWorker};
pub use pool::{PoolError, WorkerLease, WorkerPool};
pub use preprocessing::{PreprocessConfig, PreprocessedImage};
pub use recognition::{RecognitionEngine, RecognitionError, RecognitionSettings};
pub use types::{
    ExtractedItem, ExtractionResult, ImageInput, ItemKind, RecognitionHints, RecognitionMode,
    Region,
};
