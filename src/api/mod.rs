// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod detect;
pub mod errors;
pub mod server;

pub use detect::{detect_handler, DetectResponse};
pub use errors::{DetectError, ErrorBody};
pub use server::{create_router, start_server, AppState, HealthResponse};
