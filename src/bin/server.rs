//! Process entry point: load configuration, wire up the in-memory
//! storage backend, and serve the HTTP router.

use std::sync::Arc;

use sentry_mcp_auth::config::Config;
use sentry_mcp_auth::http;
use sentry_mcp_auth::state::AppState;
use sentry_mcp_auth::storage::MemoryStorage;

#[tokio::main]
async fn main() {
    let config = Config::from_env().expect("invalid configuration");

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(config.log_filter.clone()))
        .json()
        .init();

    let bind_addr = config.bind_addr;

    // The in-memory backend is sufficient for a single replica; a
    // production multi-replica deployment needs a shared KV store behind
    // the same `Storage` trait (see DESIGN.md).
    let storage = Arc::new(MemoryStorage::new());
    let state = Arc::new(AppState::new(config, storage).expect("failed to build application state"));

    let app = http::router(state);

    tracing::info!(%bind_addr, "starting server");
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .expect("failed to bind listener");
    axum::serve(listener, app)
        .await
        .expect("server exited unexpectedly");
}
