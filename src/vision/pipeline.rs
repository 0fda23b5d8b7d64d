// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Extraction pipeline: preprocessing then recognition under a deadline
//!
//! Both stages run on blocking threads. Recognition holds a worker lease
//! for its whole duration; the lease travels with the blocking task, so a
//! timed-out request gives its worker back only once the engine call has
//! actually returned.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::ProcessingError;
use crate::vision::image_utils::{check_media_type, check_payload_size, DEFAULT_MAX_IMAGE_SIZE};
use crate::vision::pool::WorkerPool;
use crate::vision::preprocessing::{preprocess_bytes, PreprocessConfig, PreprocessedImage};
use crate::vision::recognition::{
    RecognitionEngine, RecognitionError, RecognitionOutput, RecognitionRequest,
};
use crate::vision::types::{ExtractedItem, ImageInput, RecognitionMode};

/// Default recognition deadline
pub const DEFAULT_RECOGNITION_TIMEOUT_MS: u64 = 15_000;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_payload_bytes: usize,
    /// Covers waiting for a worker plus running the engines
    pub recognition_timeout: Duration,
    pub default_mode: RecognitionMode,
    pub default_language: String,
    pub preprocess: PreprocessConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: DEFAULT_MAX_IMAGE_SIZE,
            recognition_timeout: Duration::from_millis(DEFAULT_RECOGNITION_TIMEOUT_MS),
            default_mode: RecognitionMode::Auto,
            default_language: "eng".to_string(),
            preprocess: PreprocessConfig::default(),
        }
    }
}

/// Pooled worker handle; one recognition job at a time
#[derive(Debug)]
pub struct RecognitionWorker {
    id: usize,
    jobs_completed: u64,
}

impl RecognitionWorker {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            jobs_completed: 0,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn jobs_completed(&self) -> u64 {
        self.jobs_completed
    }

    fn run(
        &mut self,
        engine: &RecognitionEngine,
        image: &PreprocessedImage,
        request: &RecognitionRequest,
    ) -> Result<RecognitionOutput, RecognitionError> {
        let started = Instant::now();
        let result = engine.recognize(image, request);
        self.jobs_completed += 1;
        debug!(
            worker = self.id,
            jobs = self.jobs_completed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Recognition job finished"
        );
        result
    }
}

/// Everything a successful extraction produced
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Reading-ordered, source-space detections
    pub items: Vec<ExtractedItem>,
    pub warnings: Vec<String>,
    pub mode: RecognitionMode,
    /// Source image dimensions
    pub width: u32,
    pub height: u32,
    pub skew_corrected_deg: Option<f32>,
    /// MIME type of the detected upload format
    pub media_type: Option<&'static str>,
}

impl PipelineOutput {
    pub fn is_partial(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ExtractionPipeline {
    engine: RecognitionEngine,
    pool: WorkerPool<RecognitionWorker>,
    config: Arc<PipelineConfig>,
}

impl ExtractionPipeline {
    /// Build a pipeline with `worker_count` recognition workers (at least one)
    pub fn new(engine: RecognitionEngine, config: PipelineConfig, worker_count: usize) -> Self {
        let workers = (0..worker_count.max(1)).map(RecognitionWorker::new).collect();
        Self {
            engine,
            pool: WorkerPool::new(workers),
            config: Arc::new(config),
        }
    }

    pub fn engine(&self) -> &RecognitionEngine {
        &self.engine
    }

    pub fn pool(&self) -> &WorkerPool<RecognitionWorker> {
        &self.pool
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Validate, preprocess and recognize one image
    pub async fn run(&self, input: ImageInput) -> Result<PipelineOutput, ProcessingError> {
        if let Some(media_type) = input.media_type.as_deref() {
            check_media_type(media_type)?;
        }
        check_payload_size(input.bytes.len(), self.config.max_payload_bytes)?;

        let mode = input.hints.mode.unwrap_or(self.config.default_mode);
        let language = input
            .hints
            .language
            .clone()
            .unwrap_or_else(|| self.config.default_language.clone());

        let config = Arc::clone(&self.config);
        let bytes = input.bytes.clone();
        let image = tokio::task::spawn_blocking(move || {
            preprocess_bytes(&bytes, config.max_payload_bytes, &config.preprocess)
        })
        .await
        .map_err(|e| ProcessingError::internal(format!("preprocessing task failed: {e}")))??;

        let (width, height) = (image.source_width, image.source_height);
        let skew_corrected_deg = image.skew_corrected_deg;
        let media_type = image.media_type;
        debug!(
            width,
            height,
            scale = image.scale,
            skew = ?skew_corrected_deg,
            "Preprocessing complete"
        );

        let request = RecognitionRequest {
            mode,
            language,
            symbology: input.hints.symbology.clone(),
        };
        let image = Arc::new(image);
        let engine = self.engine.clone();
        let pool = self.pool.clone();
        let limit = self.config.recognition_timeout;

        let recognition = async move {
            let mut worker = pool.acquire().await?;
            tokio::task::spawn_blocking(move || worker.run(&engine, &image, &request))
                .await
                .map_err(|e| ProcessingError::internal(format!("recognition task failed: {e}")))?
                .map_err(ProcessingError::from)
        };

        let output = match tokio::time::timeout(limit, recognition).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    timeout_ms = limit.as_millis() as u64,
                    %mode,
                    "Recognition timed out"
                );
                return Err(ProcessingError::timeout(limit));
            }
        };

        info!(
            %mode,
            items = output.items.len(),
            partial = output.is_partial(),
            "Extraction complete"
        );

        Ok(PipelineOutput {
            items: output.items,
            warnings: output.warnings,
            mode,
            width,
            height,
            skew_corrected_deg,
            media_type,
        })
    }
}
