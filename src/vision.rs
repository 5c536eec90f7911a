// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Decoding of uploaded image bytes into raster images

use image::{DynamicImage, ImageFormat};
use thiserror::Error;

/// Maximum accepted upload size (10MB)
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Errors produced while turning uploaded bytes into a raster image.
///
/// All of these are user-correctable: the request carried bytes that are
/// not a usable image.
#[derive(Debug, Error)]
pub enum ImageDecodeError {
    #[error("image data is empty")]
    Empty,

    #[error("image is too large: {0} bytes (max: {MAX_UPLOAD_BYTES} bytes)")]
    TooLarge(usize),

    #[error("unrecognized image format")]
    UnknownFormat,

    #[error("failed to decode image: {0}")]
    Malformed(String),
}

/// A successfully decoded upload, with the metadata worth logging.
#[derive(Debug)]
pub struct DecodedImage {
    pub image: DynamicImage,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

/// Decode raw uploaded bytes into a raster image.
///
/// The format is sniffed from the content, never trusted from the request.
/// Rejects empty and oversized payloads before attempting a decode.
pub fn decode_upload(bytes: &[u8]) -> Result<DecodedImage, ImageDecodeError> {
    if bytes.is_empty() {
        return Err(ImageDecodeError::Empty);
    }
    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(ImageDecodeError::TooLarge(bytes.len()));
    }

    let format = image::guess_format(bytes).map_err(|_| ImageDecodeError::UnknownFormat)?;

    let image = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| ImageDecodeError::Malformed(e.to_string()))?;

    Ok(DecodedImage {
        width: image.width(),
        height: image.height(),
        format,
        image,
    })
}
