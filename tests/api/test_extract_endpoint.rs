// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Extraction endpoint tests for POST /extract and /v1/extract
//!
//! Covers the three upload envelopes, mode hints, symbology filtering and
//! the shape of successful responses.

use axum::http::StatusCode;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use label_scan::api::{create_router, AppState};
use label_scan::config::ServiceConfig;
use label_scan::vision::recognition::{MockTextRecognizer, TextRecognizer};
use label_scan::vision::types::Region;
use std::sync::Arc;
use tower::ServiceExt;

use crate::common::*;

const PAYLOAD: &str = "https://example.com/spool/PLA-0042";

#[tokio::test]
async fn test_raw_png_qr_returns_single_symbol() {
    let app = create_router(test_state());
    let png = qr_png(PAYLOAD);

    let response = app
        .oneshot(raw_request("/extract?mode=symbol", Some("image/png"), png))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["error"].is_null());

    let results = json["results"].as_array().unwrap();
    assert_eq!(results.len(), 1, "expected exactly one symbol: {json}");
    assert_eq!(results[0]["content"], PAYLOAD);
    assert_eq!(results[0]["kind"], "symbol");
    assert_eq!(results[0]["symbology"], "QRCODE");
    assert_eq!(results[0]["confidence"], 1.0);

    let width = json["image"]["width"].as_u64().unwrap();
    let height = json["image"]["height"].as_u64().unwrap();
    assert_bboxes_within(&json, width, height);
    assert!(json["requestId"].as_str().is_some_and(|id| !id.is_empty()));
    assert!(json["processingTimeMs"].is_u64());
}

#[tokio::test]
async fn test_multipart_upload_with_hints() {
    let app = create_router(test_state());
    let png = qr_png(PAYLOAD);

    let response = app
        .oneshot(multipart_request(
            "/extract",
            "image",
            "image/png",
            &png,
            &[("mode", "symbol")],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["results"][0]["content"], PAYLOAD);
}

#[tokio::test]
async fn test_multipart_file_field_name() {
    let app = create_router(test_state());
    let png = qr_png(PAYLOAD);

    let response = app
        .oneshot(multipart_request(
            "/v1/extract",
            "file",
            "image/png",
            &png,
            &[("mode", "symbol")],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["results"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_json_base64_upload() {
    let app = create_router(test_state());
    let body = serde_json::json!({
        "image": STANDARD.encode(qr_png(PAYLOAD)),
        "mode": "symbol",
    });

    let response = app.oneshot(json_request("/extract", body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["results"][0]["content"], PAYLOAD);
}

#[tokio::test]
async fn test_blank_image_is_ok_with_no_results() {
    let app = create_router(test_state());

    let response = app
        .oneshot(raw_request(
            "/extract?mode=symbol",
            Some("image/png"),
            blank_png(320, 240),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["results"], serde_json::json!([]));
    assert!(json["error"].is_null());
    assert_eq!(json["image"]["width"], 320);
    assert_eq!(json["image"]["height"], 240);
}

#[tokio::test]
async fn test_auto_mode_without_ocr_installed_is_ok() {
    let app = create_router(test_state());

    let response = app
        .oneshot(raw_request("/extract", Some("image/png"), qr_png(PAYLOAD)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json.get("warnings").is_none());
    assert_eq!(json["results"][0]["content"], PAYLOAD);
}

#[tokio::test]
async fn test_default_service_blank_image_is_ok() {
    let state = AppState::from_config(ServiceConfig::default()).unwrap();
    let app = create_router(state);

    let response = app
        .oneshot(raw_request("/extract", Some("image/png"), blank_png(320, 240)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["results"], serde_json::json!([]));
    assert!(json["error"].is_null());
    assert!(json.get("warnings").is_none());
}

#[tokio::test]
async fn test_auto_mode_with_failing_ocr_is_partial() {
    let text: Arc<dyn TextRecognizer> = Arc::new(MockTextRecognizer::failing("no tessdata"));
    let app = create_router(test_state_with(test_config(), Some(text)));

    let response = app
        .oneshot(raw_request("/extract", Some("image/png"), qr_png(PAYLOAD)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "partial");
    assert!(!json["warnings"].as_array().unwrap().is_empty());
    assert_eq!(json["results"][0]["content"], PAYLOAD);
}

#[tokio::test]
async fn test_text_mode_with_recognizer() {
    let text: Arc<dyn TextRecognizer> = Arc::new(
        MockTextRecognizer::single("HELLO", 0.95, Region::new(20, 40, 200, 40))
            .with_frame(400, 200),
    );
    let app = create_router(test_state_with(test_config(), Some(text)));

    let response = app
        .oneshot(raw_request(
            "/extract?mode=text",
            Some("image/png"),
            blank_png(400, 200),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    let results = json["results"].as_array().unwrap();
    assert_eq!(results.len(), 1, "passes should merge into one line: {json}");
    assert_eq!(results[0]["content"], "HELLO");
    assert_eq!(results[0]["kind"], "text");
    assert_eq!(results[0]["bbox"], serde_json::json!([20, 40, 200, 40]));
    assert!((results[0]["confidence"].as_f64().unwrap() - 0.95).abs() < 1e-6);
}

#[tokio::test]
async fn test_auto_mode_merges_text_and_symbol() {
    let text: Arc<dyn TextRecognizer> = Arc::new(
        MockTextRecognizer::single("PLA Basic", 0.9, Region::new(10, 10, 120, 20))
            .with_frame(600, 400),
    );
    let app = create_router(test_state_with(test_config(), Some(text)));
    let canvas = qr_on_canvas(PAYLOAD, 600, 400, 300, 100);

    let response = app
        .oneshot(raw_request("/extract", Some("image/png"), png_bytes(&canvas)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    let results = json["results"].as_array().unwrap();
    assert_eq!(results.len(), 2, "{json}");
    // Reading order: the text line sits above the QR code
    assert_eq!(results[0]["kind"], "text");
    assert_eq!(results[1]["kind"], "symbol");
    assert_bboxes_within(&json, 600, 400);
}

#[tokio::test]
async fn test_symbology_filter() {
    let app = create_router(test_state());

    let response = app
        .clone()
        .oneshot(raw_request(
            "/extract?mode=symbol&symbology=EAN13",
            Some("image/png"),
            qr_png(PAYLOAD),
        ))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["results"], serde_json::json!([]));

    let response = app
        .oneshot(raw_request(
            "/extract?mode=symbol&symbology=qrcode",
            Some("image/png"),
            qr_png(PAYLOAD),
        ))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["results"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_repeated_requests_are_identical() {
    let app = create_router(test_state());
    let png = qr_png(PAYLOAD);

    let first = body_json(
        app.clone()
            .oneshot(raw_request("/extract?mode=symbol", Some("image/png"), png.clone()))
            .await
            .unwrap(),
    )
    .await;
    let second = body_json(
        app.oneshot(raw_request("/extract?mode=symbol", Some("image/png"), png))
            .await
            .unwrap(),
    )
    .await;

    assert_eq!(first["status"], second["status"]);
    assert_eq!(first["results"], second["results"]);
    assert_ne!(first["requestId"], second["requestId"]);
}

#[tokio::test]
async fn test_octet_stream_is_sniffed() {
    let app = create_router(test_state());

    let response = app
        .oneshot(raw_request(
            "/extract?mode=symbol",
            Some("application/octet-stream"),
            qr_png(PAYLOAD),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["results"][0]["content"], PAYLOAD);
}
