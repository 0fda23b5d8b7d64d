// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Health and metrics endpoint tests

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use label_scan::api::create_router;
use label_scan::vision::recognition::{MockTextRecognizer, TextRecognizer};
use label_scan::vision::types::Region;
use std::sync::Arc;
use tower::ServiceExt;

use crate::common::*;

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_health_reports_degraded_without_ocr() {
    let app = create_router(test_state());

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert!(json["engines"]["text"].is_null());
    assert_eq!(json["engines"]["symbol"], "rxing");
    assert_eq!(json["workers"]["size"], 2);
    assert_eq!(json["workers"]["available"], 2);
    let features = json["features"].as_array().unwrap();
    assert!(features.iter().any(|f| f == "barcode"));
    assert_eq!(
        features.iter().any(|f| f == "ocr-tesseract"),
        cfg!(feature = "tesseract")
    );
}

#[tokio::test]
async fn test_version_endpoint() {
    let app = create_router(test_state());

    let response = app.oneshot(get("/version")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["service"], "label-scan");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert!(json["features"].as_array().unwrap().iter().any(|f| f == "qr"));
}

#[tokio::test]
async fn test_health_ok_with_both_engines() {
    let text: Arc<dyn TextRecognizer> =
        Arc::new(MockTextRecognizer::single("x", 0.5, Region::new(0, 0, 1, 1)));
    let app = create_router(test_state_with(test_config(), Some(text)));

    let json = body_json(app.oneshot(get("/health")).await.unwrap()).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["engines"]["text"], "mock");
}

#[tokio::test]
async fn test_metrics_count_requests_and_errors() {
    let app = create_router(test_state());

    let response = app
        .clone()
        .oneshot(raw_request(
            "/extract?mode=symbol",
            Some("image/png"),
            blank_png(32, 32),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(raw_request("/extract", Some("image/png"), b"junk".to_vec()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    assert_eq!(content_type.as_deref(), Some("text/plain; version=0.0.4"));

    let text = body_text(response).await;
    assert!(text.contains("label_scan_requests_total{status=\"ok\"} 1"), "{text}");
    assert!(text.contains("label_scan_requests_total{status=\"error\"} 1"), "{text}");
    assert!(text.contains("label_scan_errors_total{kind=\"DecodeError\"} 1"), "{text}");
    assert!(text.contains("label_scan_workers_available 2"), "{text}");
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let app = create_router(test_state());
    let response = app.oneshot(get("/v1/ocr")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
