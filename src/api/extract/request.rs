// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Extraction request types and ingress parsing
//!
//! An image arrives in one of three envelopes, chosen by `Content-Type`:
//! multipart form, raw image body (hints in the query string) or JSON with
//! a base64 image.

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{FromRequest, Multipart, Query, Request};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::server::AppState;
use crate::error::ProcessingError;
use crate::vision::image_utils::{check_media_type, decode_base64_payload, media_type_essence};
use crate::vision::types::{ImageInput, RecognitionHints, RecognitionMode};

/// Longest accepted language spec, e.g. "eng+deu+fra"
const MAX_LANGUAGE_LEN: usize = 64;

/// Longest accepted symbology filter
const MAX_SYMBOLOGY_LEN: usize = 32;

/// Multipart field names that carry the image
const IMAGE_FIELDS: &[&str] = &["image", "file"];

/// JSON envelope for base64 uploads
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractJsonRequest {
    /// Base64-encoded image data, optionally as a data URL
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub symbology: Option<String>,
}

impl ExtractJsonRequest {
    /// Validate the envelope and decode the image
    pub fn into_input(self) -> Result<ImageInput, ProcessingError> {
        let hints = parse_hints(
            self.mode.as_deref(),
            self.language.as_deref(),
            self.symbology.as_deref(),
        )?;
        let image = self
            .image
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ProcessingError::invalid_request("image is required"))?;
        let bytes = decode_base64_payload(&image)?;
        Ok(ImageInput::new(bytes, None).with_hints(hints))
    }
}

/// Hints carried in the query string of raw-body uploads
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HintQuery {
    pub mode: Option<String>,
    pub language: Option<String>,
    pub symbology: Option<String>,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Validate raw hint strings; empty values mean "not given"
pub fn parse_hints(
    mode: Option<&str>,
    language: Option<&str>,
    symbology: Option<&str>,
) -> Result<RecognitionHints, ProcessingError> {
    let mode = non_empty(mode)
        .map(|m| m.parse::<RecognitionMode>())
        .transpose()
        .map_err(ProcessingError::invalid_request)?;

    let language = match non_empty(language) {
        Some(lang) => {
            let valid = lang.len() <= MAX_LANGUAGE_LEN
                && lang
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '+');
            if !valid {
                return Err(ProcessingError::invalid_request(format!(
                    "unsupported language '{}'",
                    lang
                )));
            }
            Some(lang.to_string())
        }
        None => None,
    };

    let symbology = match non_empty(symbology) {
        Some(sym) => {
            let valid = sym.len() <= MAX_SYMBOLOGY_LEN
                && sym
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
            if !valid {
                return Err(ProcessingError::invalid_request(format!(
                    "unsupported symbology '{}'",
                    sym
                )));
            }
            Some(sym.to_string())
        }
        None => None,
    };

    Ok(RecognitionHints {
        mode,
        language,
        symbology,
    })
}

/// An uploaded image plus its hints, whatever envelope it came in
#[derive(Debug, Clone)]
pub struct ImageUpload(pub ImageInput);

#[async_trait]
impl FromRequest<AppState> for ImageUpload {
    type Rejection = ProcessingError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let Some(content_type) = content_type else {
            return Err(ProcessingError::unsupported_media_type(
                "missing Content-Type header",
            ));
        };
        let essence = media_type_essence(&content_type);
        debug!(content_type = %essence, "Reading upload");

        let input = match essence.as_str() {
            "multipart/form-data" => read_multipart(req, state).await?,
            "application/json" => {
                let body = read_body(req, state).await?;
                let request: ExtractJsonRequest = serde_json::from_slice(&body).map_err(|e| {
                    ProcessingError::invalid_request(format!("invalid JSON body: {}", e))
                })?;
                request.into_input()?
            }
            _ => {
                check_media_type(&essence)?;
                let query = Query::<HintQuery>::try_from_uri(req.uri())
                    .map(|Query(q)| q)
                    .map_err(|e| ProcessingError::invalid_request(e.body_text()))?;
                let hints = parse_hints(
                    query.mode.as_deref(),
                    query.language.as_deref(),
                    query.symbology.as_deref(),
                )?;
                let body = read_body(req, state).await?;
                ImageInput::new(body, Some(essence)).with_hints(hints)
            }
        };

        Ok(ImageUpload(input))
    }
}

/// Buffer the body, honoring the router's body limit
async fn read_body(req: Request, state: &AppState) -> Result<Bytes, ProcessingError> {
    Bytes::from_request(req, state).await.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ProcessingError::new(
                crate::error::ErrorKind::PayloadTooLarge,
                rejection.body_text(),
            )
        } else {
            ProcessingError::invalid_request(rejection.body_text())
        }
    })
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> ProcessingError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ProcessingError::new(crate::error::ErrorKind::PayloadTooLarge, err.body_text())
    } else {
        ProcessingError::invalid_request(err.body_text())
    }
}

async fn read_multipart(req: Request, state: &AppState) -> Result<ImageInput, ProcessingError> {
    let mut multipart = Multipart::from_request(req, state)
        .await
        .map_err(|e| ProcessingError::invalid_request(e.body_text()))?;

    let mut image: Option<(Bytes, Option<String>)> = None;
    let mut mode = None;
    let mut language = None;
    let mut symbology = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "mode" => mode = Some(field.text().await.map_err(multipart_error)?),
            "language" => language = Some(field.text().await.map_err(multipart_error)?),
            "symbology" => symbology = Some(field.text().await.map_err(multipart_error)?),
            _ => {
                let named = IMAGE_FIELDS.contains(&name.as_str());
                if !named && field.file_name().is_none() {
                    continue;
                }
                if image.is_some() {
                    return Err(ProcessingError::invalid_request(format!(
                        "multipart body carries more than one image (extra field '{}')",
                        name
                    )));
                }
                let media_type = field.content_type().map(media_type_essence);
                let bytes = field.bytes().await.map_err(multipart_error)?;
                debug!(field = %name, size = bytes.len(), "Found image field");
                image = Some((bytes, media_type));
            }
        }
    }

    let hints = parse_hints(mode.as_deref(), language.as_deref(), symbology.as_deref())?;
    let (bytes, media_type) = image.ok_or_else(|| {
        ProcessingError::invalid_request("multipart body has no image or file field")
    })?;

    Ok(ImageInput::new(bytes, media_type).with_hints(hints))
}
