// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, State};
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::detect::detect_handler;
use crate::config::ServerConfig;
use crate::detector::ObjectDetector;
use crate::vision::MAX_UPLOAD_BYTES;

/// Slack for multipart framing on top of the raw image cap
const BODY_LIMIT_OVERHEAD: usize = 64 * 1024;

static INDEX_HTML: &str = include_str!("../../assets/index.html");

/// Shared request-handler state: the detector, loaded once at startup.
#[derive(Clone)]
pub struct AppState {
    pub detector: Arc<dyn ObjectDetector>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model: String,
}

/// Build the application router with all routes and layers attached.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/detect", post(detect_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + BODY_LIMIT_OVERHEAD))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind the configured address and serve requests until the process exits.
///
/// The detector must already be loaded; nothing is accepted before the
/// model is ready.
pub async fn start_server(
    config: &ServerConfig,
    detector: Arc<dyn ObjectDetector>,
) -> anyhow::Result<()> {
    let state = AppState { detector };
    let app = create_router(state);

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Detection service listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn index_handler() -> impl IntoResponse {
    Html(INDEX_HTML)
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        model: state.detector.model_name().to_string(),
    })
}
