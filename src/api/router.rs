//! HTTP router composition, grounded in `src/api/http/router.rs`'s
//! `Router::new().route(...).with_state(...)` shape.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

use super::handlers;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/models", get(handlers::list_models))
        .route("/api/reason", post(handlers::start_reason))
        .route("/api/reason/:id/stream", get(handlers::stream_reason))
        .route("/api/traces", get(handlers::list_traces))
        .route("/api/traces/:id", get(handlers::get_trace))
        .route("/api/traces/:id/rate", post(handlers::rate_trace))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state)
}
