// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Spool label scan tests for POST /api/scan

use axum::http::StatusCode;
use label_scan::api::create_router;
use label_scan::vision::recognition::{MockTextRecognizer, TextLine, TextRecognizer};
use label_scan::vision::types::Region;
use std::sync::Arc;
use tower::ServiceExt;

use crate::common::*;

const WIDTH: u32 = 600;
const HEIGHT: u32 = 400;

fn label_text() -> Arc<dyn TextRecognizer> {
    let line = |text: &str, y: u32| TextLine {
        text: text.to_string(),
        confidence: 0.9,
        region: Region::new(10, y, 250, 20),
    };
    Arc::new(
        MockTextRecognizer::new(vec![
            line("Overture PLA Matte", 10),
            line("1kg 1.75mm 190-220°C", 40),
            line("Pine Green", 70),
        ])
        .with_frame(WIDTH, HEIGHT),
    )
}

#[tokio::test]
async fn test_scan_parses_label_fields() {
    let app = create_router(test_state_with(test_config(), Some(label_text())));
    let canvas = qr_on_canvas("https://bambulab.com/spool/1", WIDTH, HEIGHT, 320, 120);

    let response = app
        .oneshot(raw_request("/api/scan", Some("image/png"), png_bytes(&canvas)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok", "{json}");
    assert_eq!(json["results"].as_array().unwrap().len(), 4);

    let label = &json["label"];
    assert_eq!(label["brand"], "Overture");
    assert_eq!(label["material"], "PLA Matte");
    assert_eq!(label["weightG"], 1000);
    assert!((label["diameterMm"].as_f64().unwrap() - 1.75).abs() < 1e-6);
    assert_eq!(label["tempNozzle"], "190-220");
    assert_eq!(label["colorName"], "Pine Green");
    assert_eq!(label["colorHex"], "#01796F");
    assert_eq!(label["barcode"], "https://bambulab.com/spool/1");
    assert_eq!(label["barcodeType"], "QRCODE");
}

#[tokio::test]
async fn test_scan_without_ocr_uses_symbol_only() {
    let app = create_router(test_state());

    let response = app
        .oneshot(raw_request(
            "/api/scan",
            Some("image/png"),
            qr_png("https://www.bambulab.com/filament"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["label"]["brand"], "Bambu Lab");
    assert_eq!(json["label"]["barcodeType"], "QRCODE");
    assert!(json["label"]["material"].is_null());
}

#[tokio::test]
async fn test_scan_errors_have_no_label() {
    let app = create_router(test_state());

    let response = app
        .oneshot(raw_request("/api/scan", Some("image/png"), b"nope".to_vec()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let json = body_json(response).await;
    assert_eq!(json["status"], "error");
    assert!(json.get("label").is_none());
}

#[tokio::test]
async fn test_extract_has_no_label() {
    let app = create_router(test_state());

    let response = app
        .oneshot(raw_request(
            "/extract?mode=symbol",
            Some("image/png"),
            qr_png("plain"),
        ))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert!(json.get("label").is_none());
}
