// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Extraction endpoints
//!
//! - `POST /extract`, `POST /v1/extract`: text and symbol extraction
//! - `POST /api/scan`: extraction plus filament label parsing

pub mod handler;
pub mod request;
pub mod response;

pub use handler::{extract_handler, scan_handler};
pub use request::{parse_hints, ExtractJsonRequest, HintQuery, ImageUpload};
pub use response::{ExtractResponse, ImageSummary, ResponseStatus, ResultEntry};
