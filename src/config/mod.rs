// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Service configuration loaded from environment variables

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::vision::image_utils::{DEFAULT_MAX_DECODE_DIMENSION, DEFAULT_MAX_IMAGE_SIZE};
use crate::vision::pipeline::{PipelineConfig, DEFAULT_RECOGNITION_TIMEOUT_MS};
use crate::vision::preprocessing::{
    PreprocessConfig, DEFAULT_MAX_DIMENSION, DEFAULT_MAX_SKEW_SEARCH_DEG,
    DEFAULT_SKEW_THRESHOLD_DEG,
};
use crate::vision::recognition::{RecognitionSettings, DEFAULT_IOU_THRESHOLD};
use crate::vision::types::RecognitionMode;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;

/// Configuration for the extraction service
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Bind host
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Largest accepted image, in bytes (inclusive)
    pub max_payload_bytes: usize,
    /// Deadline for worker acquisition plus recognition
    pub recognition_timeout_ms: u64,
    /// Number of recognition workers
    pub worker_pool_size: usize,
    /// Overlap above which detections are merged
    pub iou_threshold: f32,
    /// Skew (degrees) below which no rotation is applied
    pub skew_threshold_deg: f32,
    /// Skew search range in degrees, each direction
    pub max_skew_search_deg: f32,
    /// Longest side kept before downscaling
    pub max_image_dimension: u32,
    /// Images wider or taller than this are rejected before decoding
    pub max_decode_dimension: u32,
    /// Mode used when a request carries no hint
    pub default_mode: RecognitionMode,
    /// Tesseract language used when a request carries no hint
    pub ocr_language: String,
    /// Directory holding `*.traineddata`; Tesseract's default when unset
    pub tessdata_dir: Option<PathBuf>,
    /// Text lines below this confidence are dropped
    pub min_text_confidence: f32,
    /// Extra 2x OCR pass for small images
    pub ocr_upscale_small_images: bool,
}

fn default_worker_pool_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

impl ServiceConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, falling back to defaults for
    /// missing or unparseable values
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            host: lookup("LABEL_SCAN_HOST").unwrap_or(defaults.host),
            port: parse_or(lookup("LABEL_SCAN_PORT"), defaults.port),
            max_payload_bytes: parse_or(lookup("MAX_PAYLOAD_BYTES"), defaults.max_payload_bytes),
            recognition_timeout_ms: parse_or(
                lookup("RECOGNITION_TIMEOUT_MS"),
                defaults.recognition_timeout_ms,
            ),
            worker_pool_size: parse_or(lookup("WORKER_POOL_SIZE"), defaults.worker_pool_size),
            iou_threshold: parse_or(lookup("IOU_THRESHOLD"), defaults.iou_threshold),
            skew_threshold_deg: parse_or(lookup("SKEW_THRESHOLD_DEG"), defaults.skew_threshold_deg),
            max_skew_search_deg: parse_or(
                lookup("MAX_SKEW_SEARCH_DEG"),
                defaults.max_skew_search_deg,
            ),
            max_image_dimension: parse_or(
                lookup("MAX_IMAGE_DIMENSION"),
                defaults.max_image_dimension,
            ),
            max_decode_dimension: parse_or(
                lookup("MAX_DECODE_DIMENSION"),
                defaults.max_decode_dimension,
            ),
            default_mode: parse_or(lookup("DEFAULT_MODE"), defaults.default_mode),
            ocr_language: lookup("OCR_LANGUAGE")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.ocr_language),
            tessdata_dir: lookup("TESSDATA_DIR")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            min_text_confidence: parse_or(
                lookup("MIN_TEXT_CONFIDENCE"),
                defaults.min_text_confidence,
            ),
            // Anything but an explicit "false"/"0" keeps the pass enabled
            ocr_upscale_small_images: lookup("OCR_UPSCALE_SMALL_IMAGES")
                .map(|v| !matches!(v.trim().to_lowercase().as_str(), "false" | "0" | "no"))
                .unwrap_or(defaults.ocr_upscale_small_images),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_payload_bytes == 0 {
            return Err("MAX_PAYLOAD_BYTES must be greater than 0".to_string());
        }
        if self.recognition_timeout_ms == 0 {
            return Err("RECOGNITION_TIMEOUT_MS must be greater than 0".to_string());
        }
        if self.worker_pool_size == 0 {
            return Err("WORKER_POOL_SIZE must be greater than 0".to_string());
        }
        if !(self.iou_threshold > 0.0 && self.iou_threshold <= 1.0) {
            return Err(format!(
                "IOU_THRESHOLD must be in (0, 1], got {}",
                self.iou_threshold
            ));
        }
        if !(0.0..=1.0).contains(&self.min_text_confidence) {
            return Err(format!(
                "MIN_TEXT_CONFIDENCE must be in [0, 1], got {}",
                self.min_text_confidence
            ));
        }
        if self.skew_threshold_deg < 0.0 || self.max_skew_search_deg < 0.0 {
            return Err("skew angles must not be negative".to_string());
        }
        if self.max_image_dimension < 32 {
            return Err("MAX_IMAGE_DIMENSION must be at least 32".to_string());
        }
        if self.max_decode_dimension < 32 {
            return Err("MAX_DECODE_DIMENSION must be at least 32".to_string());
        }
        Ok(())
    }

    /// `host:port` for binding
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn recognition_timeout(&self) -> Duration {
        Duration::from_millis(self.recognition_timeout_ms)
    }

    pub fn preprocess_config(&self) -> PreprocessConfig {
        PreprocessConfig {
            max_dimension: self.max_image_dimension,
            max_decode_dimension: self.max_decode_dimension,
            skew_threshold_deg: self.skew_threshold_deg,
            max_skew_search_deg: self.max_skew_search_deg,
            normalize_contrast: true,
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            max_payload_bytes: self.max_payload_bytes,
            recognition_timeout: self.recognition_timeout(),
            default_mode: self.default_mode,
            default_language: self.ocr_language.clone(),
            preprocess: self.preprocess_config(),
        }
    }

    pub fn recognition_settings(&self) -> RecognitionSettings {
        RecognitionSettings {
            iou_threshold: self.iou_threshold,
            min_text_confidence: self.min_text_confidence,
            upscale_small_images: self.ocr_upscale_small_images,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_payload_bytes: DEFAULT_MAX_IMAGE_SIZE,
            recognition_timeout_ms: DEFAULT_RECOGNITION_TIMEOUT_MS,
            worker_pool_size: default_worker_pool_size(),
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            skew_threshold_deg: DEFAULT_SKEW_THRESHOLD_DEG,
            max_skew_search_deg: DEFAULT_MAX_SKEW_SEARCH_DEG,
            max_image_dimension: DEFAULT_MAX_DIMENSION,
            max_decode_dimension: DEFAULT_MAX_DECODE_DIMENSION,
            default_mode: RecognitionMode::Auto,
            ocr_language: "eng".to_string(),
            tessdata_dir: None,
            min_text_confidence: 0.0,
            ocr_upscale_small_images: true,
        }
    }
}
