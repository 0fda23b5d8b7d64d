// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Version information for the label scan service

/// Semantic version number
pub const VERSION_NUMBER: &str = env!("CARGO_PKG_VERSION");

/// Service name used in logs and health responses
pub const SERVICE_NAME: &str = "label-scan";

/// Optional capabilities compiled into this build
pub fn features() -> Vec<&'static str> {
    let mut features = vec!["barcode", "qr", "deskew", "filament-label"];
    if cfg!(feature = "tesseract") {
        features.push("ocr-tesseract");
    }
    features
}

/// Get formatted version string for logging
pub fn get_version_string() -> String {
    format!("{} {}", SERVICE_NAME, VERSION_NUMBER)
}

/// Get full version info for API responses
pub fn get_version_info() -> serde_json::Value {
    serde_json::json!({
        "service": SERVICE_NAME,
        "version": VERSION_NUMBER,
        "features": features(),
    })
}
