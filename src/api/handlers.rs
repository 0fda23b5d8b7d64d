// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Health and metrics handlers

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::server::AppState;
use crate::error::ProcessingError;
use crate::version;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    /// Text engine name, `null` when OCR is unavailable
    pub text: Option<String>,
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub size: usize,
    pub available: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `ok`, or `degraded` when an engine is missing
    pub status: String,
    pub version: String,
    /// Capabilities compiled into this build
    pub features: Vec<String>,
    pub engines: EngineStatus,
    pub workers: WorkerStatus,
}

/// GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let engine = state.pipeline.engine();
    let pool = state.pipeline.pool();

    let engines = EngineStatus {
        text: engine.text_engine_name().map(str::to_string),
        symbol: engine.symbol_engine_name().map(str::to_string),
    };
    let status = if engines.text.is_some() && engines.symbol.is_some() {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: version::VERSION_NUMBER.to_string(),
        features: version::features().into_iter().map(str::to_string).collect(),
        engines,
        workers: WorkerStatus {
            size: pool.size(),
            available: pool.available(),
        },
    })
}

/// GET /version
pub async fn version_handler() -> Json<serde_json::Value> {
    Json(version::get_version_info())
}

/// GET /metrics - Prometheus text exposition
pub async fn metrics_handler(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ProcessingError> {
    state
        .metrics
        .set_workers_available(state.pipeline.pool().available());
    let body = state
        .metrics
        .render()
        .map_err(|e| ProcessingError::internal(format!("failed to render metrics: {}", e)))?;

    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}
