// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Error taxonomy shared by every stage of the extraction pipeline

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::vision::image_utils::ImageError;
use crate::vision::pool::PoolError;
use crate::vision::recognition::RecognitionError;

/// Error kinds reported to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed request envelope: no image, unknown mode, bad language
    InvalidRequest,
    PayloadTooLarge,
    UnsupportedMediaType,
    /// Bytes are not a decodable image
    DecodeError,
    RecognitionTimeout,
    /// The requested engine is not compiled in or not configured
    EngineUnavailable,
    InternalError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "InvalidRequest",
            ErrorKind::PayloadTooLarge => "PayloadTooLarge",
            ErrorKind::UnsupportedMediaType => "UnsupportedMediaType",
            ErrorKind::DecodeError => "DecodeError",
            ErrorKind::RecognitionTimeout => "RecognitionTimeout",
            ErrorKind::EngineUnavailable => "EngineUnavailable",
            ErrorKind::InternalError => "InternalError",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::InvalidRequest => 400,
            ErrorKind::PayloadTooLarge => 413,
            ErrorKind::UnsupportedMediaType => 415,
            ErrorKind::DecodeError => 422,
            ErrorKind::InternalError => 500,
            ErrorKind::EngineUnavailable => 503,
            ErrorKind::RecognitionTimeout => 504,
        }
    }

    /// Client-side problem (4xx)
    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed extraction: what went wrong and a human-readable detail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl ProcessingError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn invalid_request(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, detail)
    }

    pub fn unsupported_media_type(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnsupportedMediaType, detail)
    }

    pub fn payload_too_large(len: usize, max: usize) -> Self {
        Self::new(
            ErrorKind::PayloadTooLarge,
            format!("image is {} bytes, limit is {} bytes", len, max),
        )
    }

    pub fn timeout(limit: Duration) -> Self {
        Self::new(
            ErrorKind::RecognitionTimeout,
            format!("recognition exceeded {} ms", limit.as_millis()),
        )
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalError, detail)
    }

    pub fn status_code(&self) -> u16 {
        self.kind.status_code()
    }
}

impl fmt::Display for ProcessingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

impl std::error::Error for ProcessingError {}

impl From<ImageError> for ProcessingError {
    fn from(err: ImageError) -> Self {
        match err {
            ImageError::TooLarge(len, max) => ProcessingError::payload_too_large(len, max),
            ImageError::DimensionsTooLarge(_) => {
                ProcessingError::new(ErrorKind::PayloadTooLarge, err.to_string())
            }
            ImageError::UnsupportedMediaType(_) => {
                ProcessingError::new(ErrorKind::UnsupportedMediaType, err.to_string())
            }
            ImageError::InvalidBase64(_)
            | ImageError::UnsupportedFormat
            | ImageError::DecodeFailed(_)
            | ImageError::EmptyData => ProcessingError::new(ErrorKind::DecodeError, err.to_string()),
            ImageError::EncodeFailed(_) => ProcessingError::internal(err.to_string()),
        }
    }
}

impl From<RecognitionError> for ProcessingError {
    fn from(err: RecognitionError) -> Self {
        match err {
            RecognitionError::EngineUnavailable { .. } => {
                ProcessingError::new(ErrorKind::EngineUnavailable, err.to_string())
            }
            RecognitionError::EngineFailed { .. } => ProcessingError::internal(err.to_string()),
        }
    }
}

impl From<PoolError> for ProcessingError {
    fn from(err: PoolError) -> Self {
        ProcessingError::internal(err.to_string())
    }
}
