//! # storybook-server
//!
//! HTTP backend for the collaborative children's storybook.
//!
//! This binary provides:
//! - **Story CRUD** over a SQLite document store, with owner / editor /
//!   viewer access rules
//! - **Collaboration** routes for managing collaborators and the polled
//!   chapter editor
//! - **Generation** routes drafting, illustrating, rewriting and transcribing
//!   through an OpenAI-compatible API
//! - **Per-IP rate limiting** to protect against abuse

mod ai;
mod api;
mod auth;
mod config;
mod error;
mod generation;
mod rate_limit;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use storybook_store::Database;

use crate::ai::OpenAiClient;
use crate::api::AppState;
use crate::auth::SessionVerifier;
use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Tracing (respects RUST_LOG)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,storybook_server=debug")),
        )
        .init();

    info!("Starting storybook server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");
    if config.identity_pubkey.is_none() {
        tracing::warn!("IDENTITY_PUBKEY not set, authenticated routes will answer 401");
    }
    if config.ai.api_key.is_none() {
        tracing::warn!("OPENAI_API_KEY not set, generation routes will fail");
    }

    // -----------------------------------------------------------------------
    // 3. Subsystems
    // -----------------------------------------------------------------------
    let db = Database::open_at(&config.database_path)?;
    let sessions = SessionVerifier::new(config.identity_pubkey);
    let ai = Arc::new(OpenAiClient::new(&config.ai)?);
    let http_addr = config.http_addr;

    let app_state = AppState::new(db, sessions, ai, config);

    // -----------------------------------------------------------------------
    // 4. Background housekeeping
    // -----------------------------------------------------------------------

    // Every 5 minutes, forget clients idle for more than 10.
    let limiter = app_state.rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            limiter.purge_idle(Duration::from_secs(600)).await;
        }
    });

    let sessions = app_state.sessions.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(600));
        loop {
            interval.tick().await;
            sessions.purge_expired().await;
        }
    });

    // -----------------------------------------------------------------------
    // 5. HTTP API (until failure or Ctrl+C)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
