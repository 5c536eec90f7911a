// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! API error taxonomy and response conversion

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detector::InferenceError;
use crate::vision::ImageDecodeError;

/// Structured error body returned for every failed request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub error: String,
}

/// Everything that can go wrong handling a detection request.
///
/// All variants are caught at the handler boundary and converted to a
/// structured JSON body; nothing propagates as an unstructured crash.
#[derive(Debug, Error)]
pub enum DetectError {
    /// No `image` field was present in the multipart form
    #[error("No image uploaded")]
    MissingInput,

    /// Bytes were present but not decodable as an image
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// The detector could not process a validly-decoded image
    #[error("Inference failed: {0}")]
    InferenceFailed(String),
}

impl DetectError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            DetectError::MissingInput | DetectError::InvalidImage(_) => StatusCode::BAD_REQUEST,
            DetectError::InferenceFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ImageDecodeError> for DetectError {
    fn from(err: ImageDecodeError) -> Self {
        DetectError::InvalidImage(err.to_string())
    }
}

impl From<InferenceError> for DetectError {
    fn from(err: InferenceError) -> Self {
        DetectError::InferenceFailed(err.to_string())
    }
}

impl IntoResponse for DetectError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_input_is_400_with_exact_message() {
        let err = DetectError::MissingInput;
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "No image uploaded");
    }

    #[test]
    fn test_invalid_image_is_400() {
        let err = DetectError::InvalidImage("unrecognized image format".to_string());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_inference_failure_is_500() {
        let err = DetectError::InferenceFailed("session error".to_string());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_body_serialization() {
        let body = ErrorBody {
            error: "No image uploaded".to_string(),
        };
        let json = serde_json::to_string(&body).unwrap();
        assert_eq!(json, r#"{"error":"No image uploaded"}"#);
    }

    #[test]
    fn test_decode_error_conversion() {
        let err: DetectError = ImageDecodeError::Empty.into();
        assert!(matches!(err, DetectError::InvalidImage(_)));
    }

    #[test]
    fn test_inference_error_conversion() {
        let err: DetectError = InferenceError::Session("boom".to_string()).into();
        assert!(matches!(err, DetectError::InferenceFailed(_)));
        assert!(err.to_string().contains("boom"));
    }
}
