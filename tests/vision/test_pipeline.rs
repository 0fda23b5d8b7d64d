// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! End-to-end pipeline runs under concurrency

use futures::future::join_all;
use label_scan::error::ErrorKind;
use label_scan::vision::pipeline::{ExtractionPipeline, PipelineConfig};
use label_scan::vision::recognition::{
    MockTextRecognizer, RecognitionEngine, RecognitionSettings, RxingDecoder, SymbolDecoder,
    TextRecognizer,
};
use label_scan::vision::types::{ImageInput, RecognitionHints, RecognitionMode, Region};
use std::sync::Arc;
use std::time::Duration;

use crate::common::*;

fn pipeline(text: Option<Arc<dyn TextRecognizer>>, config: PipelineConfig, workers: usize) -> ExtractionPipeline {
    let symbols: Arc<dyn SymbolDecoder> = Arc::new(RxingDecoder::new());
    let settings = RecognitionSettings {
        upscale_small_images: false,
        ..Default::default()
    };
    ExtractionPipeline::new(RecognitionEngine::new(text, Some(symbols), settings), config, workers)
}

fn symbol_input(png: Vec<u8>) -> ImageInput {
    ImageInput::new(png, Some("image/png".to_string())).with_hints(RecognitionHints {
        mode: Some(RecognitionMode::Symbol),
        ..Default::default()
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_all_complete() {
    let pipeline = pipeline(None, PipelineConfig::default(), 2);
    let png = qr_png("CONCURRENT");

    let runs = (0..8).map(|_| {
        let pipeline = pipeline.clone();
        let input = symbol_input(png.clone());
        tokio::spawn(async move { pipeline.run(input).await })
    });
    for result in join_all(runs).await {
        let output = result.unwrap().unwrap();
        assert_eq!(output.items.len(), 1);
        assert_eq!(output.items[0].content, "CONCURRENT");
    }
    assert_eq!(pipeline.pool().available(), 2);
}

#[tokio::test]
async fn test_deadline_includes_waiting_for_a_worker() {
    let slow: Arc<dyn TextRecognizer> = Arc::new(
        MockTextRecognizer::single("slow", 0.9, Region::new(0, 0, 4, 4))
            .with_delay(Duration::from_millis(150)),
    );
    let config = PipelineConfig {
        recognition_timeout: Duration::from_millis(250),
        ..Default::default()
    };
    let pipeline = pipeline(Some(slow), config, 1);
    let text_input = || {
        ImageInput::new(blank_png(32, 32), None).with_hints(RecognitionHints {
            mode: Some(RecognitionMode::Text),
            ..Default::default()
        })
    };

    // Two passes of 150ms each hold the only worker past the second
    // request's deadline
    let first = {
        let pipeline = pipeline.clone();
        let input = text_input();
        tokio::spawn(async move { pipeline.run(input).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    let second = pipeline.run(text_input()).await;

    let first = first.await.unwrap();
    assert!(first.is_err(), "first run needs ~300ms of a 250ms deadline");
    assert_eq!(second.unwrap_err().kind, ErrorKind::RecognitionTimeout);

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(pipeline.pool().available(), 1);
}

#[tokio::test]
async fn test_auto_mode_with_failing_text_is_partial() {
    let broken: Arc<dyn TextRecognizer> = Arc::new(MockTextRecognizer::failing("no tessdata"));
    let pipeline = pipeline(Some(broken), PipelineConfig::default(), 1);

    let input = ImageInput::new(qr_png("PARTIAL"), None).with_hints(RecognitionHints {
        mode: Some(RecognitionMode::Auto),
        ..Default::default()
    });
    let output = pipeline.run(input).await.unwrap();
    assert!(output.is_partial());
    assert!(output.warnings[0].contains("no tessdata"));
    assert_eq!(output.items.len(), 1);
    assert_eq!(output.items[0].content, "PARTIAL");
}

#[tokio::test]
async fn test_default_mode_comes_from_config() {
    let config = PipelineConfig {
        default_mode: RecognitionMode::Symbol,
        ..Default::default()
    };
    let pipeline = pipeline(None, config, 1);

    let output = pipeline
        .run(ImageInput::new(qr_png("DEFAULT"), None))
        .await
        .unwrap();
    assert_eq!(output.mode, RecognitionMode::Symbol);
    assert!(!output.is_partial());
    assert_eq!(output.items[0].content, "DEFAULT");
}
