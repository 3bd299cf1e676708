//! rame-server library interface
//!
//! Exposes the list registry, scanning engine, status aggregation and the
//! HTTP router for the binary and for integration tests.

pub mod api;
pub mod db;
pub mod error;
pub mod library;
pub mod probe;
pub mod scanner;
pub mod status;
pub mod storage;
pub mod store;

pub use crate::error::{ApiError, ApiResult};
pub use crate::library::{Library, LibrarySettings, NewPlaylist};

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub library: Arc<Library>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(library: Arc<Library>) -> Self {
        Self {
            library,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::list_routes())
        .merge(api::status_routes())
        .merge(api::health_routes())
        .route("/events", get(api::event_stream))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
