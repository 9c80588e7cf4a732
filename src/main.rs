//! Keygate - Main Application Entry Point
//!
//! This is an HTTP service that issues time-limited, single-use access keys, binds each
//! key to the first holder that redeems it, and serves a protected script to holders of
//! valid keys. Chat bot front-ends call the token-protected API; the script runtime calls
//! the public delivery endpoint.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Storage**: JSON file, written atomically, with an in-memory authoritative copy
//! - **Concurrency**: one writer lock for every mutation, lock-free snapshot reads
//! - **Authentication**: bearer API token compared by SHA-256 digest
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Open the key store (refuses to start on a corrupted file)
//! 3. Start the periodic prune task
//! 4. Build HTTP router with routes and middleware
//! 5. Start server on configured port

mod config;
mod error;
mod handlers;
mod middleware;
mod models;
mod routes;
mod services;
mod state;
mod store;

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use crate::{services::pruner, state::AppState, store::KeyStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging with tracing subscriber. Reads RUST_LOG environment variable (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = config::Config::from_env()?;
    tracing::info!("Configuration loaded");

    let store = Arc::new(KeyStore::open(&config.keys_file).await?);

    let mut state = AppState::new(Arc::clone(&store), &config.api_token, config.prune_policy);
    if let Some(path) = &config.script_path {
        let script = tokio::fs::read_to_string(path).await?;
        tracing::info!(path = %path.display(), "Script loaded");
        state = state.with_script(script);
    }

    // Hourly (by default) cleanup, serialized with request mutations by the store lock
    tokio::spawn(pruner::run_prune_loop(
        store,
        Duration::from_secs(config.prune_interval_secs),
        config.prune_policy,
    ));

    let app = routes::router(state);

    // Bind to network address and start server
    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
