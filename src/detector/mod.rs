// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Object detection backends
//!
//! The HTTP layer talks to a detector only through the [`ObjectDetector`]
//! trait, so tests can substitute a stub for the real ONNX session.

pub mod labels;
pub mod yolo;

use image::DynamicImage;
use thiserror::Error;

pub use labels::{class_name, COCO_CLASSES};
pub use yolo::{YoloConfig, YoloDetector};

/// Errors from running a validly-decoded image through a detector.
///
/// Distinct from decode failures, which happen before the detector is
/// invoked and map to a 400 rather than a 500.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("inference failed: {0}")]
    Session(String),

    #[error("unexpected model output shape: {0:?}")]
    OutputShape(Vec<usize>),
}

/// Axis-aligned bounding box in original-image pixel space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Intersection-over-union with another box. Zero when disjoint.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);

        let intersection = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            return 0.0;
        }
        intersection / union
    }
}

/// One recognized object instance in an image.
#[derive(Debug, Clone)]
pub struct Detection {
    /// Class name from the model's fixed vocabulary
    pub label: String,
    /// Class index in the model's output
    pub class_id: u32,
    /// Detection confidence (0.0-1.0)
    pub confidence: f32,
    /// Location in original-image pixel space
    pub bbox: BoundingBox,
}

/// A detection backend: given a decoded raster image, produce the objects
/// recognized in it.
///
/// Implementations must be safe to call concurrently without external
/// locking; the session is the backend's concern, not the caller's.
pub trait ObjectDetector: Send + Sync {
    /// Run inference and return zero or more detections in model output
    /// order. Does not mutate the input image.
    fn detect(&self, image: &DynamicImage) -> Result<Vec<Detection>, InferenceError>;

    /// Human-readable model name, used for health reporting and logs.
    fn model_name(&self) -> &str;
}
