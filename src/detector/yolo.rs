// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! YOLOv8 detection backend
//!
//! Drives a YOLOv8 ONNX export through ONNX Runtime on CPU. The model takes
//! a 640x640 letterboxed RGB tensor and emits `[1, 4 + num_classes, anchors]`
//! with box centers in model space; postprocessing maps boxes back to the
//! original image and applies class-wise non-maximum suppression.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use image::DynamicImage;
use ndarray::{Array4, ArrayViewD, IxDyn};
use ort::execution_providers::CPUExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use tracing::{debug, info};

use super::labels::class_name;
use super::{BoundingBox, Detection, InferenceError, ObjectDetector};

/// Model input edge length (YOLOv8 exports use 640x640)
pub const YOLO_INPUT_SIZE: u32 = 640;

/// Letterbox gray fill, matching the ultralytics preprocessing
const PAD_VALUE: u8 = 114;

/// Configuration for loading a [`YoloDetector`].
#[derive(Debug, Clone)]
pub struct YoloConfig {
    /// Path to the ONNX model file
    pub model_path: PathBuf,
    /// Minimum confidence for a detection to be kept
    pub confidence_threshold: f32,
    /// IoU threshold for non-maximum suppression
    pub iou_threshold: f32,
}

impl Default for YoloConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("./models/yolov8n.onnx"),
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
        }
    }
}

/// How the original image was placed inside the model input tensor.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    x_offset: f32,
    y_offset: f32,
    orig_width: u32,
    orig_height: u32,
}

/// YOLOv8 object detector backed by an ONNX Runtime session.
///
/// Loaded once at process start; the session is guarded by a mutex so
/// concurrent requests can share one instance without caller-side locking.
pub struct YoloDetector {
    session: Arc<Mutex<Session>>,
    input_name: String,
    model_name: String,
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl std::fmt::Debug for YoloDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YoloDetector")
            .field("input_name", &self.input_name)
            .field("model_name", &self.model_name)
            .field("confidence_threshold", &self.confidence_threshold)
            .field("iou_threshold", &self.iou_threshold)
            .finish_non_exhaustive()
    }
}

impl YoloDetector {
    /// Load the detection model from an ONNX file.
    ///
    /// # Errors
    /// Returns an error if the model file is missing or ONNX Runtime cannot
    /// build a session from it.
    pub async fn new(config: YoloConfig) -> Result<Self> {
        let model_path = config.model_path.as_path();

        if !model_path.exists() {
            anyhow::bail!("detection model not found: {}", model_path.display());
        }

        info!("Loading detection model from {}", model_path.display());

        // CPU-only execution; the model is small and the service has no GPU
        // scheduling concerns.
        let session = Session::builder()
            .context("Failed to create session builder")?
            .with_execution_providers([CPUExecutionProvider::default().build()])
            .context("Failed to set CPU execution provider")?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .context("Failed to set optimization level")?
            .with_intra_threads(4)
            .context("Failed to set intra threads")?
            .commit_from_file(model_path)
            .context(format!(
                "Failed to load detection model from {}",
                model_path.display()
            ))?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .unwrap_or_else(|| "images".to_string());

        let model_name = model_stem(model_path);

        debug!("Detection model loaded - input: {}", input_name);
        info!("Detection model ready: {} (CPU-only)", model_name);

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            input_name,
            model_name,
            confidence_threshold: config.confidence_threshold.clamp(0.0, 1.0),
            iou_threshold: config.iou_threshold.clamp(0.0, 1.0),
        })
    }

    /// Current confidence threshold
    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }
}

impl ObjectDetector for YoloDetector {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<Detection>, InferenceError> {
        let (input, letterbox) = preprocess(image);

        let mut session = self.session.lock().unwrap();

        let input_value = Value::from_array(input)
            .map_err(|e| InferenceError::Session(format!("failed to build input tensor: {e}")))?;

        let outputs = session
            .run(ort::inputs![&self.input_name => input_value])
            .map_err(|e| InferenceError::Session(e.to_string()))?;

        let output = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| InferenceError::Session(format!("failed to extract output: {e}")))?;

        let detections = parse_output(output.view(), &letterbox, self.confidence_threshold)?;
        let mut kept = nms(detections, self.iou_threshold);
        kept.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
        });

        debug!("Detected {} objects", kept.len());

        Ok(kept)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

fn model_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "yolov8".to_string())
}

/// Letterbox-resize the image into a normalized NCHW tensor.
///
/// Aspect ratio is preserved; the remainder is padded with gray and the
/// image centered, matching the preprocessing the model was exported with.
fn preprocess(image: &DynamicImage) -> (Array4<f32>, Letterbox) {
    let rgb = image.to_rgb8();
    let (orig_width, orig_height) = rgb.dimensions();

    let max_dim = orig_width.max(orig_height).max(1);
    let scale = YOLO_INPUT_SIZE as f32 / max_dim as f32;
    let new_width = ((orig_width as f32 * scale) as u32).max(1);
    let new_height = ((orig_height as f32 * scale) as u32).max(1);

    let resized = image::imageops::resize(
        &rgb,
        new_width,
        new_height,
        image::imageops::FilterType::Lanczos3,
    );

    let x_offset = (YOLO_INPUT_SIZE - new_width) / 2;
    let y_offset = (YOLO_INPUT_SIZE - new_height) / 2;

    let size = YOLO_INPUT_SIZE as usize;
    let mut tensor = Array4::from_elem((1, 3, size, size), PAD_VALUE as f32 / 255.0);

    for y in 0..new_height {
        for x in 0..new_width {
            let pixel = resized.get_pixel(x, y);
            let ty = (y + y_offset) as usize;
            let tx = (x + x_offset) as usize;
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = pixel[c] as f32 / 255.0;
            }
        }
    }

    let letterbox = Letterbox {
        scale,
        x_offset: x_offset as f32,
        y_offset: y_offset as f32,
        orig_width,
        orig_height,
    };

    (tensor, letterbox)
}

/// Parse raw model output into detections in original-image space.
///
/// Expects `[1, 4 + num_classes, anchors]`: box center/size in rows 0-3,
/// per-class scores in the remaining rows.
fn parse_output(
    output: ArrayViewD<f32>,
    letterbox: &Letterbox,
    confidence_threshold: f32,
) -> Result<Vec<Detection>, InferenceError> {
    let shape = output.shape();
    if shape.len() != 3 || shape[0] != 1 || shape[1] <= 4 {
        return Err(InferenceError::OutputShape(shape.to_vec()));
    }

    let num_classes = shape[1] - 4;
    let num_anchors = shape[2];
    let mut detections = Vec::new();

    for i in 0..num_anchors {
        let mut best_confidence = 0.0f32;
        let mut best_class_id = 0u32;
        for class_idx in 0..num_classes {
            let score = output[IxDyn(&[0, 4 + class_idx, i])];
            if score > best_confidence {
                best_confidence = score;
                best_class_id = class_idx as u32;
            }
        }

        if best_confidence <= confidence_threshold {
            continue;
        }

        let x_center = output[IxDyn(&[0, 0, i])];
        let y_center = output[IxDyn(&[0, 1, i])];
        let width = output[IxDyn(&[0, 2, i])];
        let height = output[IxDyn(&[0, 3, i])];

        // Model space -> original image space, undoing the letterbox
        let x1 = (x_center - width / 2.0 - letterbox.x_offset) / letterbox.scale;
        let y1 = (y_center - height / 2.0 - letterbox.y_offset) / letterbox.scale;
        let x2 = (x_center + width / 2.0 - letterbox.x_offset) / letterbox.scale;
        let y2 = (y_center + height / 2.0 - letterbox.y_offset) / letterbox.scale;

        let max_x = letterbox.orig_width as f32;
        let max_y = letterbox.orig_height as f32;

        detections.push(Detection {
            label: class_name(best_class_id).to_string(),
            class_id: best_class_id,
            confidence: best_confidence,
            bbox: BoundingBox {
                x1: x1.clamp(0.0, max_x),
                y1: y1.clamp(0.0, max_y),
                x2: x2.clamp(0.0, max_x),
                y2: y2.clamp(0.0, max_y),
            },
        });
    }

    Ok(detections)
}

/// Class-wise non-maximum suppression.
///
/// Classes are visited in id order and candidates in confidence order, so
/// the result is deterministic for a given model output.
fn nms(detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    if detections.is_empty() {
        return detections;
    }

    let mut class_groups: BTreeMap<u32, Vec<Detection>> = BTreeMap::new();
    for detection in detections {
        class_groups
            .entry(detection.class_id)
            .or_default()
            .push(detection);
    }

    let mut kept = Vec::new();

    for (_, mut candidates) in class_groups {
        candidates.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
        });

        let mut suppressed = vec![false; candidates.len()];
        for i in 0..candidates.len() {
            if suppressed[i] {
                continue;
            }
            for j in (i + 1)..candidates.len() {
                if !suppressed[j] && candidates[i].bbox.iou(&candidates[j].bbox) > iou_threshold {
                    suppressed[j] = true;
                }
            }
            kept.push(candidates[i].clone());
        }
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::ArrayD;

    fn letterbox_for(width: u32, height: u32) -> (Array4<f32>, Letterbox) {
        let image = DynamicImage::new_rgb8(width, height);
        preprocess(&image)
    }

    fn det(class_id: u32, confidence: f32, x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
        Detection {
            label: class_name(class_id).to_string(),
            class_id,
            confidence,
            bbox: BoundingBox { x1, y1, x2, y2 },
        }
    }

    #[test]
    fn test_preprocess_tensor_shape() {
        let (tensor, _) = letterbox_for(100, 100);
        assert_eq!(tensor.shape(), &[1, 3, 640, 640]);
    }

    #[test]
    fn test_preprocess_letterbox_landscape() {
        let (_, lb) = letterbox_for(64, 32);
        assert_eq!(lb.scale, 10.0);
        assert_eq!(lb.x_offset, 0.0);
        // 32 * 10 = 320 tall, centered in 640
        assert_eq!(lb.y_offset, 160.0);
        assert_eq!(lb.orig_width, 64);
        assert_eq!(lb.orig_height, 32);
    }

    #[test]
    fn test_preprocess_pads_with_gray() {
        let (tensor, _) = letterbox_for(64, 32);
        // Top-left corner is padding for a landscape image
        let expected = PAD_VALUE as f32 / 255.0;
        assert!((tensor[[0, 0, 0, 0]] - expected).abs() < 1e-6);
    }

    #[test]
    fn test_parse_output_maps_back_to_image_space() {
        let (_, lb) = letterbox_for(64, 32);

        // One anchor: a confident person centered in model space
        let mut output = ArrayD::<f32>::zeros(IxDyn(&[1, 84, 1]));
        output[IxDyn(&[0, 0, 0])] = 320.0; // cx
        output[IxDyn(&[0, 1, 0])] = 320.0; // cy
        output[IxDyn(&[0, 2, 0])] = 100.0; // w
        output[IxDyn(&[0, 3, 0])] = 100.0; // h
        output[IxDyn(&[0, 4, 0])] = 0.9; // person score

        let detections = parse_output(output.view(), &lb, 0.25).unwrap();
        assert_eq!(detections.len(), 1);

        let d = &detections[0];
        assert_eq!(d.label, "person");
        assert_eq!(d.class_id, 0);
        assert!((d.confidence - 0.9).abs() < 1e-6);
        assert!((d.bbox.x1 - 27.0).abs() < 1e-4);
        assert!((d.bbox.y1 - 11.0).abs() < 1e-4);
        assert!((d.bbox.x2 - 37.0).abs() < 1e-4);
        assert!((d.bbox.y2 - 21.0).abs() < 1e-4);
    }

    #[test]
    fn test_parse_output_respects_confidence_threshold() {
        let (_, lb) = letterbox_for(100, 100);

        let mut output = ArrayD::<f32>::zeros(IxDyn(&[1, 84, 2]));
        // Anchor 0: below threshold
        output[IxDyn(&[0, 4, 0])] = 0.1;
        // Anchor 1: above threshold, class 56 (chair)
        output[IxDyn(&[0, 0, 1])] = 320.0;
        output[IxDyn(&[0, 1, 1])] = 320.0;
        output[IxDyn(&[0, 2, 1])] = 50.0;
        output[IxDyn(&[0, 3, 1])] = 50.0;
        output[IxDyn(&[0, 60, 1])] = 0.8;

        let detections = parse_output(output.view(), &lb, 0.25).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].label, "chair");
    }

    #[test]
    fn test_parse_output_picks_highest_scoring_class() {
        let (_, lb) = letterbox_for(100, 100);

        let mut output = ArrayD::<f32>::zeros(IxDyn(&[1, 84, 1]));
        output[IxDyn(&[0, 0, 0])] = 320.0;
        output[IxDyn(&[0, 1, 0])] = 320.0;
        output[IxDyn(&[0, 2, 0])] = 50.0;
        output[IxDyn(&[0, 3, 0])] = 50.0;
        output[IxDyn(&[0, 4, 0])] = 0.4; // person
        output[IxDyn(&[0, 19, 0])] = 0.7; // cat (class 15)

        let detections = parse_output(output.view(), &lb, 0.25).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].label, "cat");
        assert_eq!(detections[0].class_id, 15);
    }

    #[test]
    fn test_parse_output_rejects_bad_shape() {
        let (_, lb) = letterbox_for(100, 100);
        let output = ArrayD::<f32>::zeros(IxDyn(&[1, 84]));
        let result = parse_output(output.view(), &lb, 0.25);
        assert!(matches!(result, Err(InferenceError::OutputShape(_))));
    }

    #[test]
    fn test_nms_suppresses_overlapping_same_class() {
        let detections = vec![
            det(0, 0.9, 0.0, 0.0, 100.0, 100.0),
            det(0, 0.8, 5.0, 5.0, 105.0, 105.0),
            det(0, 0.7, 300.0, 300.0, 400.0, 400.0),
        ];
        let kept = nms(detections, 0.45);
        assert_eq!(kept.len(), 2);
        assert!((kept[0].confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_nms_keeps_overlapping_different_classes() {
        let detections = vec![
            det(0, 0.9, 0.0, 0.0, 100.0, 100.0),
            det(56, 0.8, 0.0, 0.0, 100.0, 100.0),
        ];
        let kept = nms(detections, 0.45);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_nms_empty() {
        assert!(nms(Vec::new(), 0.45).is_empty());
    }

    #[tokio::test]
    async fn test_model_not_found_error() {
        let config = YoloConfig {
            model_path: PathBuf::from("/nonexistent/yolov8n.onnx"),
            ..Default::default()
        };
        let result = YoloDetector::new(config).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("not found"));
    }
}
