// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! HTTP API

pub mod errors;
pub mod extract;
pub mod handlers;
pub mod metrics;
pub mod server;

pub use extract::{ExtractResponse, ImageUpload, ResponseStatus, ResultEntry};
pub use handlers::HealthResponse;
pub use metrics::ServiceMetrics;
pub use server::{create_router, serve, ApiServer, AppState};
