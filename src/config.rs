// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Environment-driven process configuration

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Default listening port (Render and similar hosts override via PORT)
const DEFAULT_PORT: u16 = 5000;

/// Default path to the YOLOv8 ONNX export
const DEFAULT_MODEL_PATH: &str = "./models/yolov8n.onnx";

/// Server and detector configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on; the service always binds all interfaces
    pub port: u16,
    /// Path to the detection model file
    pub model_path: PathBuf,
    /// Minimum confidence for a detection to be reported
    pub confidence_threshold: f32,
    /// IoU threshold for non-maximum suppression
    pub iou_threshold: f32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
        }
    }
}

impl ServerConfig {
    /// Build a configuration from environment variables, falling back to
    /// defaults for anything unset or unparseable.
    ///
    /// Recognized variables: `PORT`, `MODEL_PATH`, `CONFIDENCE_THRESHOLD`,
    /// `IOU_THRESHOLD`.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port = env::var("PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(defaults.port);

        let model_path = env::var("MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.model_path);

        let confidence_threshold = env::var("CONFIDENCE_THRESHOLD")
            .ok()
            .and_then(|v| v.parse::<f32>().ok())
            .unwrap_or(defaults.confidence_threshold);

        let iou_threshold = env::var("IOU_THRESHOLD")
            .ok()
            .and_then(|v| v.parse::<f32>().ok())
            .unwrap_or(defaults.iou_threshold);

        Self {
            port,
            model_path,
            confidence_threshold,
            iou_threshold,
        }
    }

    /// Socket address to bind; all interfaces, configured port.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }
}
