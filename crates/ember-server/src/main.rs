//! # ember-server
//!
//! HTTP front end for the Ember swipe and matching engine.
//!
//! This binary provides:
//! - **REST API** (axum) for the discovery queue, like/dislike decisions,
//!   quota status, match listing and blocking
//! - **Session authentication** against Ed25519 tokens issued by the
//!   identity service
//! - **Profile resync** endpoint for profile-update code, guarded by a
//!   shared internal token
//! - **Sinks** for analytics (JSONL file) and match notifications (webhook)

mod api;
mod auth;
mod config;
mod error;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use ember_engine::analytics::{
    run_jsonl_writer, AnalyticsSink, ChannelAnalytics, LogAnalytics, WriterSettings,
};
use ember_engine::notify::{LogNotifier, MatchNotifier, WebhookNotifier};
use ember_engine::SwipeEngine;
use ember_store::Store;

use crate::api::AppState;
use crate::auth::SessionVerifier;
use crate::config::ServerConfig;

/// Events buffered between the engine and the analytics writer.
const ANALYTICS_BUFFER: usize = 4096;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("info,ember_server=debug,ember_engine=debug")
            }),
        )
        .init();

    info!("Starting Ember server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(engine = ?config.engine, "Loaded configuration");
    info!(
        database = %config.database_path.display(),
        internal_enabled = config.internal_token.is_some(),
        analytics_file = config.analytics_path.is_some(),
        webhook = config.match_webhook_url.is_some(),
        "Instance settings"
    );

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    let store = Arc::new(Store::open(&config.database_path)?);

    let analytics: Arc<dyn AnalyticsSink> = match &config.analytics_path {
        Some(path) => {
            let (sink, rx) = ChannelAnalytics::channel(ANALYTICS_BUFFER);
            tokio::spawn(run_jsonl_writer(rx, WriterSettings::new(path.clone())));
            info!(path = %path.display(), "Writing analytics events");
            Arc::new(sink)
        }
        None => Arc::new(LogAnalytics),
    };

    let notifier: Arc<dyn MatchNotifier> = match &config.match_webhook_url {
        Some(url) => {
            info!(url = %url, "Publishing matches to webhook");
            Arc::new(WebhookNotifier::new(url.clone(), tokio::runtime::Handle::current())?)
        }
        None => Arc::new(LogNotifier),
    };

    let engine = SwipeEngine::new(store, config.engine.clone())
        .with_analytics(analytics)
        .with_notifier(notifier);

    let app_state = AppState {
        engine: Arc::new(engine),
        sessions: Arc::new(SessionVerifier::new(config.session_pubkey)),
        config: Arc::new(config.clone()),
    };

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Periodic session cache cleanup (every 10 minutes)
    let sessions = app_state.sessions.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(600));
        loop {
            interval.tick().await;
            sessions.purge_expired().await;
        }
    });

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
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
