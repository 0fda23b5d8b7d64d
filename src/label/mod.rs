// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Filament spool label parsing
//!
//! Derives brand, material, weight, temperatures, diameter and colour from
//! OCR text plus the first decoded symbol of a scanned spool label.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::vision::types::{ExtractedItem, ExtractionResult};

/// Diameter assumed when the label does not state one
pub const DEFAULT_DIAMETER_MM: f32 = 1.75;

/// Symbologies whose payload is a retail product code
const RETAIL_SYMBOLOGIES: &[&str] = &["EAN13", "UPCA", "EAN8", "UPCE"];

const BRANDS: &[&str] = &[
    "Bambu",
    "Overture",
    "eSun",
    "Sunlu",
    "Polymaker",
    "Hatchbox",
    "Prusament",
    "Creality",
    "Eryone",
    "Amolen",
    "Inland",
];

const COLORS: &[(&str, &str)] = &[
    ("Black", "#000000"),
    ("White", "#FFFFFF"),
    ("Gray", "#808080"),
    ("Grey", "#808080"),
    ("Red", "#FF0000"),
    ("Blue", "#0000FF"),
    ("Green", "#008000"),
    ("Yellow", "#FFFF00"),
    ("Orange", "#FFA500"),
    ("Purple", "#800080"),
    ("Pink", "#FFC0CB"),
    ("Brown", "#A52A2A"),
    ("Silver", "#C0C0C0"),
    ("Gold", "#FFD700"),
    ("Copper", "#B87333"),
    ("Bronze", "#CD7F32"),
    ("Teal", "#008080"),
    ("Cyan", "#00FFFF"),
    ("Magenta", "#FF00FF"),
    ("Lime", "#00FF00"),
    ("Olive", "#808000"),
    ("Maroon", "#800000"),
    ("Navy", "#000080"),
    ("Aquamarine", "#7FFFD4"),
    ("Turquoise", "#40E0D0"),
    ("Violet", "#EE82EE"),
    ("Indigo", "#4B0082"),
    ("Beige", "#F5F5DC"),
    ("Ivory", "#FFFFF0"),
    ("Khaki", "#F0E68C"),
    ("Coral", "#FF7F50"),
    ("Salmon", "#FA8072"),
    ("Crimson", "#DC143C"),
    ("Lavender", "#E6E6FA"),
    ("Plum", "#DDA0DD"),
    ("Tan", "#D2B48C"),
    ("Mint", "#98FF98"),
    ("Peach", "#FFDAB9"),
    ("Charcoal", "#36454F"),
    ("Slate", "#708090"),
    ("Galaxy", "#222222"),
    ("Sparkle", "#444444"),
    ("Glow", "#CCFFCC"),
    ("Transparent", "#EFEFEF"),
    ("Clear", "#EFEFEF"),
    ("Natural", "#F5F5DC"),
    ("Pine Green", "#01796F"),
];

/// Structured data read off a spool label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilamentLabel {
    pub brand: Option<String>,
    /// e.g. "PLA", "PETG Matte"
    pub material: Option<String>,
    pub weight_g: Option<u32>,
    pub diameter_mm: f32,
    /// Nozzle range as printed, e.g. "190-230"
    pub temp_nozzle: Option<String>,
    pub color_name: Option<String>,
    pub color_hex: Option<String>,
    pub filament_code: Option<String>,
    pub barcode: Option<String>,
    pub barcode_type: Option<String>,
}

impl Default for FilamentLabel {
    fn default() -> Self {
        Self {
            brand: None,
            material: None,
            weight_g: None,
            diameter_mm: DEFAULT_DIAMETER_MM,
            temp_nozzle: None,
            color_name: None,
            color_hex: None,
            filament_code: None,
            barcode: None,
            barcode_type: None,
        }
    }
}

/// Compiled label patterns; build once and share
#[derive(Debug, Clone)]
pub struct LabelParser {
    filament_code: Regex,
    sku: Regex,
    material: Regex,
    material_subtype: Regex,
    weight: Regex,
    temperature: Regex,
    diameter: Regex,
    brands: Vec<(&'static str, Regex)>,
    /// Longest name first so "Pine Green" wins over "Green"
    colors: Vec<(&'static str, &'static str, Regex)>,
}

fn word_pattern(word: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(r"(?i)\b{}\b", regex::escape(word)))
}

impl LabelParser {
    pub fn new() -> Result<Self, regex::Error> {
        let brands = BRANDS
            .iter()
            .map(|b| word_pattern(b).map(|re| (*b, re)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut by_length: Vec<&(&str, &str)> = COLORS.iter().collect();
        // Stable: equal lengths keep table order
        by_length.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        let colors = by_length
            .into_iter()
            .map(|(name, hex)| word_pattern(name).map(|re| (*name, *hex, re)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            filament_code: Regex::new(r"(?is)Filament\s*Code.*?(\d{5})")?,
            sku: Regex::new(r"(?i)(?:SKU|Ref|P/N)[\s.:)]+([A-Z0-9-]{4,15})")?,
            material: Regex::new(r"(?i)\b(PLA(?:\+| plus)?|PETG|ABS(?:-GF)?|TPU|ASA|Nylon|PC|PVA|CF)\b")?,
            material_subtype: Regex::new(
                r"(?i)(Basic|Matte|Silk|Translucent|Galaxy|Sparkle|Wood|Carbon Fiber)",
            )?,
            weight: Regex::new(r"(?i)(\d{1,4})\s?(g|kg)")?,
            temperature: Regex::new(r"(\d{2,3})\s?-\s?(\d{2,3})\s?°?C")?,
            diameter: Regex::new(r"(1\.75|2\.85|3\.00)\s?mm")?,
            brands,
            colors,
        })
    }

    /// Parse the text items and first symbol of an extraction
    pub fn parse_result(&self, result: &ExtractionResult) -> FilamentLabel {
        self.parse(&result.full_text(), result.first_symbol())
    }

    /// Parse OCR `text`, with `symbol` as the decoded barcode if any
    pub fn parse(&self, text: &str, symbol: Option<&ExtractedItem>) -> FilamentLabel {
        let mut label = FilamentLabel::default();

        if let Some(symbol) = symbol {
            let symbology = symbol.symbology.clone().unwrap_or_default();
            label.barcode = Some(symbol.content.clone());
            label.barcode_type = Some(symbology.clone());

            if RETAIL_SYMBOLOGIES.contains(&symbology.as_str()) {
                label.filament_code = Some(symbol.content.clone());
            }
            if symbology == "QRCODE" && symbol.content.to_lowercase().contains("bambulab") {
                label.brand = Some("Bambu Lab".to_string());
            }
        }

        // A printed code overrides the barcode payload
        if let Some(caps) = self.filament_code.captures(text) {
            label.filament_code = Some(caps[1].to_string());
        } else if let Some(caps) = self.sku.captures(text) {
            label.filament_code = Some(caps[1].to_string());
        }

        if let Some((brand, _)) = self.brands.iter().find(|(_, re)| re.is_match(text)) {
            label.brand = Some(brand.to_string());
        }

        if let Some(m) = self.material.find(text) {
            let mut material = m.as_str().to_uppercase();
            if let Some(caps) = self.material_subtype.captures(text) {
                material = format!("{} {}", material, &caps[1]);
            }
            label.material = Some(material);
        }

        if let Some(caps) = self.weight.captures(text) {
            if let Ok(value) = caps[1].parse::<u32>() {
                let unit = caps[2].to_lowercase();
                // "1 g" on a spool label is an OCR-mangled "1 kg"
                let grams = if unit == "kg" || value < 10 {
                    value * 1000
                } else {
                    value
                };
                label.weight_g = Some(grams);
            }
        }

        if let Some(caps) = self.temperature.captures(text) {
            label.temp_nozzle = Some(format!("{}-{}", &caps[1], &caps[2]));
        }

        if let Some(caps) = self.diameter.captures(text) {
            if let Ok(d) = caps[1].parse::<f32>() {
                label.diameter_mm = d;
            }
        }

        if let Some((name, hex, _)) = self.colors.iter().find(|(_, _, re)| re.is_match(text)) {
            label.color_name = Some(name.to_string());
            label.color_hex = Some(hex.to_string());
        }

        label
    }
}
