// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Detection endpoint handler

use axum::extract::{Multipart, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::errors::DetectError;
use super::server::AppState;
use crate::summary::render_summary;
use crate::vision::decode_upload;

/// Successful detection response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectResponse {
    /// Natural-language summary of the detected objects
    pub message: String,
}

/// POST /detect - Detect objects in an uploaded image
///
/// Accepts a multipart form with an `image` field holding raw image bytes
/// and returns a natural-language summary of what the model recognized.
///
/// # Errors
/// - 400 Bad Request: no `image` field, or bytes that do not decode as an image
/// - 500 Internal Server Error: inference failed on a valid image
pub async fn detect_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<DetectResponse>, DetectError> {
    // 1. Presence check, before any decode attempt. Only the `image` field
    //    is read; if several are sent the first one wins.
    let mut image_bytes = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| DetectError::InvalidImage(e.to_string()))?
    {
        if field.name() == Some("image") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| DetectError::InvalidImage(e.to_string()))?;
            image_bytes = Some(bytes);
            break;
        }
    }

    let image_bytes = match image_bytes {
        Some(bytes) => bytes,
        None => {
            warn!("Detection request without an image field");
            return Err(DetectError::MissingInput);
        }
    };

    // 2. Decode the upload into a raster image
    let decoded = decode_upload(&image_bytes).map_err(|e| {
        warn!("Failed to decode uploaded image: {}", e);
        DetectError::from(e)
    })?;

    debug!(
        "Decoded {:?} upload: {}x{}, {} bytes",
        decoded.format,
        decoded.width,
        decoded.height,
        image_bytes.len()
    );

    // 3. Run inference
    let detections = state.detector.detect(&decoded.image).map_err(|e| {
        warn!("Inference failed: {}", e);
        DetectError::from(e)
    })?;

    // 4-5. Tally and render. An empty set is a valid zero-result outcome,
    //      not an error.
    let message = render_summary(&detections);

    info!(
        "Detection complete: {} objects -> {:?}",
        detections.len(),
        message
    );

    Ok(Json(DetectResponse { message }))
}
