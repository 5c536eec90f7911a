// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod api;
pub mod config;
pub mod detector;
pub mod summary;
pub mod vision;

pub use api::{DetectError, DetectResponse};
pub use config::ServerConfig;
pub use detector::{BoundingBox, Detection, InferenceError, ObjectDetector};
pub use summary::{render_summary, tally_labels, EMPTY_SCENE_MESSAGE};
pub use vision::{decode_upload, ImageDecodeError};
