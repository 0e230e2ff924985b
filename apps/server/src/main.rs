use std::sync::Arc;

use server::{auth::Argon2Verifier, build_app, config::Config, state::AppState};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env();
    let state = AppState::new(Arc::new(Argon2Verifier), config.presence_grace);
    let app = build_app(state, &config.static_dir);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await.unwrap();
    tracing::info!(
        "TalkSpace server running on {}",
        listener.local_addr().unwrap()
    );
    axum::serve(listener, app).await.unwrap();
}
