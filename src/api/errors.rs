// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! HTTP rendering of processing errors

use axum::response::{IntoResponse, Response};
use uuid::Uuid;

use super::extract::response::ExtractResponse;
use crate::error::ProcessingError;

/// Errors leaving a handler directly get the same envelope as extraction
/// failures, with the status code of their kind
impl IntoResponse for ProcessingError {
    fn into_response(self) -> Response {
        ExtractResponse::failure(self, 0, Uuid::new_v4().to_string()).into_response()
    }
}
