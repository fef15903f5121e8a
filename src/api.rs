// src/api.rs
// Pass-through HTTP surface: platform health check, Prometheus metrics, and
// the static thumbnail files the embeds reference. No alarm state lives here.
use std::path::Path;

use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::metrics::Metrics;

pub fn create_router(thumbnail_dir: &Path, metrics: &Metrics) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(metrics.router())
        .nest_service("/thumbnails", ServeDir::new(thumbnail_dir))
        .layer(CorsLayer::very_permissive())
}
