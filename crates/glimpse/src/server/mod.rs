//! HTTP front end for the captioner.
//!
//! Routes:
//! - `POST /predict`: multipart upload with an `image` field, answers
//!   `{"caption": "..."}`
//! - `GET /health`: liveness probe

pub mod error;
pub mod routes;
pub mod shutdown;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use glimpse_core::Captioner;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use shutdown::shutdown_signal;

/// Shared, read-only handler state.
#[derive(Clone)]
pub struct AppState {
    pub captioner: Arc<Captioner>,
}

impl AppState {
    pub fn new(captioner: Captioner) -> Self {
        Self {
            captioner: Arc::new(captioner),
        }
    }
}

/// Build the router. Any origin may call it.
pub fn create_router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/predict", post(routes::predict))
        .route("/health", get(routes::health))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
