// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Extraction response types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::ProcessingError;
use crate::label::FilamentLabel;
use crate::vision::pipeline::PipelineOutput;
use crate::vision::types::{ExtractedItem, ItemKind};

/// Overall outcome of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Ok,
    /// One engine produced results, the other failed
    Partial,
    Error,
}

/// One detection as returned to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEntry {
    pub content: String,
    pub confidence: f32,
    /// `[x, y, width, height]` in source-image pixels
    pub bbox: [u32; 4],
    pub kind: ItemKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbology: Option<String>,
}

impl From<ExtractedItem> for ResultEntry {
    fn from(item: ExtractedItem) -> Self {
        Self {
            bbox: item.region.to_array(),
            content: item.content,
            confidence: item.confidence,
            kind: item.kind,
            symbology: item.symbology,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSummary {
    pub width: u32,
    pub height: u32,
    /// Rotation applied by deskew, when one was applied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skew_corrected_deg: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

/// Response body for every extraction endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractResponse {
    pub status: ResponseStatus,
    pub results: Vec<ResultEntry>,
    /// Always present; `null` on success
    pub error: Option<ProcessingError>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageSummary>,
    /// Processing time in milliseconds
    pub processing_time_ms: u64,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<FilamentLabel>,
}

impl ExtractResponse {
    /// Successful (possibly partial, possibly empty) extraction
    pub fn success(output: PipelineOutput, processing_time_ms: u64, request_id: String) -> Self {
        let status = if output.is_partial() {
            ResponseStatus::Partial
        } else {
            ResponseStatus::Ok
        };
        Self {
            status,
            results: output.items.into_iter().map(ResultEntry::from).collect(),
            error: None,
            warnings: output.warnings,
            image: Some(ImageSummary {
                width: output.width,
                height: output.height,
                skew_corrected_deg: output.skew_corrected_deg,
                media_type: output.media_type.map(str::to_string),
            }),
            processing_time_ms,
            request_id,
            label: None,
        }
    }

    pub fn failure(error: ProcessingError, processing_time_ms: u64, request_id: String) -> Self {
        Self {
            status: ResponseStatus::Error,
            results: Vec::new(),
            error: Some(error),
            warnings: Vec::new(),
            image: None,
            processing_time_ms,
            request_id,
            label: None,
        }
    }

    pub fn with_label(mut self, label: FilamentLabel) -> Self {
        self.label = Some(label);
        self
    }

    pub fn http_status(&self) -> StatusCode {
        match &self.error {
            Some(err) => StatusCode::from_u16(err.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            None => StatusCode::OK,
        }
    }
}

impl IntoResponse for ExtractResponse {
    fn into_response(self) -> Response {
        (self.http_status(), Json(self)).into_response()
    }
}
