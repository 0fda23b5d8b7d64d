// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Extraction endpoint handlers

use axum::extract::State;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::request::ImageUpload;
use super::response::ExtractResponse;
use crate::api::server::AppState;
use crate::error::ProcessingError;
use crate::vision::types::{ExtractionResult, ItemKind, RecognitionMode};

/// POST /extract - Extract text and symbols from an image
///
/// Also served at `/v1/extract`.
///
/// # Request
/// One of:
/// - `multipart/form-data` with an `image` or `file` part and optional
///   `mode`, `language`, `symbology` text parts
/// - a raw image body (`image/png`, `image/jpeg`, ...) with hints in the
///   query string
/// - `application/json`: `{ "image": base64, "mode", "language", "symbology" }`
///
/// # Response
/// - `status`: `ok`, `partial` or `error`
/// - `results`: detections in reading order with `bbox` as `[x, y, w, h]`
/// - `error`: `{ kind, detail }` or `null`
/// - `processingTimeMs`, `requestId`
///
/// # Errors
/// - 400 Bad Request: malformed envelope or hint
/// - 413 Payload Too Large: image over the configured limit
/// - 415 Unsupported Media Type: content type not an accepted image type
/// - 422 Unprocessable Entity: bytes are not a decodable image
/// - 503 Service Unavailable: requested engine not available
/// - 504 Gateway Timeout: recognition exceeded the deadline
pub async fn extract_handler(
    State(state): State<AppState>,
    upload: Result<ImageUpload, ProcessingError>,
) -> ExtractResponse {
    process(&state, upload, false).await
}

/// POST /api/scan - Extract and parse a filament spool label
///
/// Runs in `auto` mode unless the request hints otherwise, and adds a
/// `label` object parsed from the recognized text and first symbol.
pub async fn scan_handler(
    State(state): State<AppState>,
    upload: Result<ImageUpload, ProcessingError>,
) -> ExtractResponse {
    let upload = upload.map(|ImageUpload(mut input)| {
        input.hints.mode.get_or_insert(RecognitionMode::Auto);
        ImageUpload(input)
    });
    process(&state, upload, true).await
}

async fn process(
    state: &AppState,
    upload: Result<ImageUpload, ProcessingError>,
    parse_label: bool,
) -> ExtractResponse {
    let started = Instant::now();
    let request_id = Uuid::new_v4().to_string();

    let result = match upload {
        Ok(ImageUpload(input)) => {
            debug!(
                request_id = %request_id,
                bytes = input.bytes.len(),
                media_type = ?input.media_type,
                "Extraction request received"
            );
            state.pipeline.run(input).await
        }
        Err(e) => Err(e),
    };

    let elapsed = started.elapsed();
    let elapsed_ms = elapsed.as_millis() as u64;

    let response = match result {
        Ok(output) => {
            let text = output.items.iter().filter(|i| i.kind == ItemKind::Text).count();
            let symbols = output.items.len() - text;
            state.metrics.record_results(text, symbols);

            info!(
                request_id = %request_id,
                mode = %output.mode,
                text,
                symbols,
                partial = output.is_partial(),
                elapsed_ms,
                "Extraction succeeded"
            );

            let label = parse_label.then(|| {
                state.label_parser.parse_result(&ExtractionResult {
                    items: output.items.clone(),
                })
            });
            let response = ExtractResponse::success(output, elapsed_ms, request_id);
            match label {
                Some(label) => response.with_label(label),
                None => response,
            }
        }
        Err(e) => {
            if e.kind.is_client_error() {
                info!(request_id = %request_id, kind = %e.kind, "Extraction rejected: {}", e.detail);
            } else {
                warn!(request_id = %request_id, kind = %e.kind, "Extraction failed: {}", e.detail);
            }
            state.metrics.record_error(e.kind);
            ExtractResponse::failure(e, elapsed_ms, request_id)
        }
    };

    state.metrics.record_request(response.status, elapsed);
    response
}
