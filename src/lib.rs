// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod api;
pub mod config;
pub mod error;
pub mod label;
pub mod version;
pub mod vision;

// Re-export main types
pub use config::ServiceConfig;
pub use error::{ErrorKind, ProcessingError};
pub use label::{FilamentLabel, LabelParser};
pub use vision::{
    ExtractedItem, ExtractionPipeline, ExtractionResult, ImageInput, RecognitionEngine,
    RecognitionHints, RecognitionMode, Region,
};
