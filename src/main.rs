// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};

use vision_detect_node::api;
use vision_detect_node::config::ServerConfig;
use vision_detect_node::detector::{YoloConfig, YoloDetector};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Initialize tracing subscriber for logging
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    let config = ServerConfig::from_env();

    // Load the model before the listener starts accepting connections;
    // it stays read-only for the process lifetime.
    let detector = YoloDetector::new(YoloConfig {
        model_path: config.model_path.clone(),
        confidence_threshold: config.confidence_threshold,
        iou_threshold: config.iou_threshold,
    })
    .await
    .context("failed to load detection model")?;

    api::start_server(&config, Arc::new(detector)).await
}
