// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! CarePartner sync server
//!
//! Follows the diabetes data of people who shared it through Tidepool and
//! serves presentation-ready snapshots to a UI.

use carepartner_sync::{
    config::Config,
    db::FileRosterStore,
    services::{FolloweeManager, StaticSession, TidepoolClient},
    AppState,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(port = config.port, api_url = %config.api_url, "Starting CarePartner sync");

    let sessions = Arc::new(StaticSession::new(
        config.user_id.clone(),
        config.session_token.clone(),
    ));
    let client = Arc::new(TidepoolClient::new(config.api_url.clone(), sessions));

    let store = Arc::new(FileRosterStore::open(&config.data_dir).await?);

    // Loads the persisted roster before any network activity
    let manager = FolloweeManager::start(client, store, config.sync.clone()).await;

    spawn_poller(manager.clone(), config.poll_interval_secs);

    let state = Arc::new(AppState {
        config: config.clone(),
        manager,
    });

    let app = carepartner_sync::routes::create_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Refresh roster and invites on a fixed period, starting immediately.
fn spawn_poller(manager: Arc<FolloweeManager>, interval_secs: u64) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            manager.poll().await;
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

/// Initialize structured JSON logging.
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("carepartner_sync=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
