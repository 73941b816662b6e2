// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP transport for the admission gateway.

pub mod http;

use std::sync::Arc;

use axum::routing::{any, get};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::GateState;

/// Build the axum `Router` with all gateway routes.
pub fn build_router(state: Arc<GateState>) -> Router {
    Router::new()
        // Admission (every method lands here; non-POST answers 405)
        .route("/", any(http::admit))
        // Health
        .route("/api/v1/health", get(http::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
