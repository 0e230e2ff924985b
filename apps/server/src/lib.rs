use std::path::Path;

use axum::{routing::get, Router};
use tower_http::{
    cors::CorsLayer,
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

pub mod auth;
pub mod config;
pub mod conversations;
pub mod directory;
pub mod router;
pub mod sessions;
pub mod state;
pub mod validation;
pub mod ws;

use state::AppState;

/// Assemble the HTTP surface: the WebSocket endpoint, a liveness probe,
/// and the static front-end with an `index.html` fallback.
pub fn build_app(state: AppState, static_dir: &Path) -> Router {
    let static_files =
        ServeDir::new(static_dir).not_found_service(ServeFile::new(static_dir.join("index.html")));

    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(ws::ws_handler))
        .fallback_service(static_files)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
