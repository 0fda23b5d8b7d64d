// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Recognition engine over real preprocessed images

use image::DynamicImage;
use label_scan::vision::preprocessing::{preprocess_image, rotate_about_center, PreprocessConfig};
use label_scan::vision::recognition::{
    RecognitionEngine, RecognitionRequest, RecognitionSettings, RxingDecoder, SymbolDecoder,
};
use label_scan::vision::types::{ItemKind, RecognitionMode};
use std::sync::Arc;

use crate::common::*;

fn symbol_engine() -> RecognitionEngine {
    let symbols: Arc<dyn SymbolDecoder> = Arc::new(RxingDecoder::new());
    RecognitionEngine::new(None, Some(symbols), RecognitionSettings::default())
}

fn symbol_request() -> RecognitionRequest {
    RecognitionRequest {
        mode: RecognitionMode::Symbol,
        language: "eng".to_string(),
        symbology: None,
    }
}

#[test]
fn test_qr_on_downscaled_image_maps_to_source_pixels() {
    let (width, height) = (5000, 1000);
    let (qr_x, qr_y) = (4000, 300);
    let canvas = qr_on_canvas("SPOOL-7731", width, height, qr_x, qr_y);
    let qr_side = qr_image("SPOOL-7731").width();

    let image = preprocess_image(&DynamicImage::ImageLuma8(canvas), &PreprocessConfig::default());
    assert!(image.scale < 1.0);

    let output = symbol_engine().recognize(&image, &symbol_request()).unwrap();
    assert_eq!(output.items.len(), 1);

    let item = &output.items[0];
    assert_eq!(item.content, "SPOOL-7731");
    assert_eq!(item.kind, ItemKind::Symbol);
    assert!(item.region.fits_within(width, height));
    // Located on the QR code, in source coordinates
    assert!(item.region.x >= qr_x - 20 && item.region.right() <= qr_x + qr_side + 20);
    assert!(item.region.y >= qr_y - 20 && item.region.bottom() <= qr_y + qr_side + 20);
}

#[test]
fn test_qr_bbox_on_deskewed_scene_is_in_upload_coordinates() {
    let (width, height) = (1200u32, 900u32);
    let (qr_x, qr_y) = (900u32, 600u32);
    let qr = qr_image("SPOOL-SKEW");
    let side = qr.width() as f32;

    let mut scene = bars_image(width, height);
    image::imageops::replace(&mut scene, &qr, qr_x as i64, qr_y as i64);
    let upload = rotate_about_center(&scene, -6.0);

    // Where the QR centre ends up in the uploaded (rotated) image
    let (cx, cy) = ((width as f32 - 1.0) / 2.0, (height as f32 - 1.0) / 2.0);
    let (dx, dy) = (qr_x as f32 + side / 2.0 - cx, qr_y as f32 + side / 2.0 - cy);
    let (s, c) = 6.0f32.to_radians().sin_cos();
    let expected_x = cx + dx * c - dy * s;
    let expected_y = cy + dx * s + dy * c;

    let image = preprocess_image(&DynamicImage::ImageLuma8(upload), &PreprocessConfig::default());
    assert!(image.skew_corrected_deg.is_some(), "scene should be deskewed");

    let output = symbol_engine().recognize(&image, &symbol_request()).unwrap();
    let item = output
        .items
        .iter()
        .find(|i| i.content == "SPOOL-SKEW")
        .expect("QR decoded");
    assert!(item.region.fits_within(width, height));

    let centre_x = item.region.x as f32 + item.region.width as f32 / 2.0;
    let centre_y = item.region.y as f32 + item.region.height as f32 / 2.0;
    assert!(
        (centre_x - expected_x).abs() < 15.0 && (centre_y - expected_y).abs() < 15.0,
        "bbox {:?} centred at ({centre_x}, {centre_y}), QR at ({expected_x}, {expected_y})",
        item.region
    );
    // The box covers the code's centre in the uploaded image
    assert!(item.region.x as f32 <= expected_x && item.region.right() as f32 >= expected_x);
    assert!(item.region.y as f32 <= expected_y && item.region.bottom() as f32 >= expected_y);
}

#[test]
fn test_two_codes_in_reading_order() {
    let mut canvas = blank_image(700, 300);
    image::imageops::replace(&mut canvas, &qr_image("RIGHT"), 420, 20);
    image::imageops::replace(&mut canvas, &qr_image("LEFT"), 20, 40);

    let image = preprocess_image(&DynamicImage::ImageLuma8(canvas), &PreprocessConfig::default());
    let output = symbol_engine().recognize(&image, &symbol_request()).unwrap();

    let payloads: Vec<&str> = output.items.iter().map(|i| i.content.as_str()).collect();
    assert_eq!(payloads.len(), 2, "{:?}", payloads);
    assert!(payloads.contains(&"LEFT") && payloads.contains(&"RIGHT"));
    for pair in output.items.windows(2) {
        assert!(
            (pair[0].region.y, pair[0].region.x) <= (pair[1].region.y, pair[1].region.x),
            "not in reading order: {:?}",
            payloads
        );
    }
}

#[test]
fn test_blank_image_yields_nothing() {
    let image = preprocess_image(
        &DynamicImage::ImageLuma8(blank_image(300, 200)),
        &PreprocessConfig::default(),
    );
    let output = symbol_engine().recognize(&image, &symbol_request()).unwrap();
    assert!(output.items.is_empty());
    assert!(!output.is_partial());
}

#[cfg(feature = "tesseract")]
mod tesseract {
    use super::*;
    use image::{GrayImage, Luma};
    use label_scan::vision::recognition::{TesseractRecognizer, TextRecognizer};

    /// 5x7 glyphs, one row per string, '#' is ink
    const GLYPHS: &[(char, [&str; 7])] = &[
        ('H', ["#...#", "#...#", "#...#", "#####", "#...#", "#...#", "#...#"]),
        ('E', ["#####", "#....", "#....", "####.", "#....", "#....", "#####"]),
        ('L', ["#....", "#....", "#....", "#....", "#....", "#....", "#####"]),
        ('O', [".###.", "#...#", "#...#", "#...#", "#...#", "#...#", ".###."]),
    ];

    fn render(word: &str, cell: u32) -> GrayImage {
        let margin = cell * 4;
        let advance = cell * 6;
        let width = margin * 2 + advance * word.len() as u32;
        let height = margin * 2 + cell * 7;
        let mut img = GrayImage::from_pixel(width, height, Luma([255]));

        for (i, ch) in word.chars().enumerate() {
            let Some((_, rows)) = GLYPHS.iter().find(|(c, _)| *c == ch) else {
                continue;
            };
            let x0 = margin + advance * i as u32;
            for (gy, row) in rows.iter().enumerate() {
                for (gx, px) in row.chars().enumerate() {
                    if px != '#' {
                        continue;
                    }
                    for dy in 0..cell {
                        for dx in 0..cell {
                            img.put_pixel(
                                x0 + gx as u32 * cell + dx,
                                margin + gy as u32 * cell + dy,
                                Luma([0]),
                            );
                        }
                    }
                }
            }
        }
        img
    }

    #[test]
    fn test_hello_is_read() {
        let tessdata = std::env::var("TESSDATA_DIR").ok().map(std::path::PathBuf::from);
        let recognizer = match TesseractRecognizer::new(tessdata.as_deref(), "eng") {
            Ok(r) => r,
            Err(e) => {
                eprintln!("skipping: {}", e);
                return;
            }
        };
        let text: Arc<dyn TextRecognizer> = Arc::new(recognizer);
        let engine = RecognitionEngine::new(Some(text), None, RecognitionSettings::default());

        let img = render("HELLO", 8);
        let (width, height) = img.dimensions();
        let image = preprocess_image(&DynamicImage::ImageLuma8(img), &PreprocessConfig::default());
        let request = RecognitionRequest {
            mode: RecognitionMode::Text,
            language: "eng".to_string(),
            symbology: None,
        };
        let output = engine.recognize(&image, &request).unwrap();

        let hello = output
            .items
            .iter()
            .find(|i| i.content.to_uppercase().contains("HELLO"))
            .expect("HELLO should be recognized");
        assert!(hello.confidence > 0.0 && hello.confidence <= 1.0);
        assert!(hello.region.fits_within(width, height));
    }
}
