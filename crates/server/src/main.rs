mod bootstrap;
mod discovery;
mod health;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use vitrine_core::config::{AppConfig, LoadOptions};
use vitrine_core::DiscoveryEngine;

const VIEW_SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

fn init_logging(config: &AppConfig) {
    use tracing::Level;
    use vitrine_core::config::LogFormat::*;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    spawn_view_sweeper(app.engine.clone());

    let router =
        discovery::router(app.engine.clone()).merge(health::router(app.db_pool.clone()));
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        bind_address = %address,
        "vitrine-server listening"
    );

    let server = axum::serve(listener, router).with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
    });
    let server_task = tokio::spawn(async move { server.await });

    wait_for_shutdown().await?;
    let drain_limit = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    tracing::info!(
        event_name = "system.server.stopping",
        drain_limit_secs = drain_limit.as_secs(),
        "vitrine-server draining connections"
    );
    match tokio::time::timeout(drain_limit, server_task).await {
        Ok(joined) => joined??,
        Err(_) => {
            tracing::warn!(
                event_name = "system.server.drain_timeout",
                "open connections exceeded the drain limit, stopping anyway"
            );
        }
    }

    app.db_pool.close().await;
    tracing::info!(event_name = "system.server.stopped", "vitrine-server stopped");
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}

/// Deletes view rows past the retention horizon once a day. The read paths
/// already filter by the horizon, so the sweep only reclaims space.
fn spawn_view_sweeper(engine: Arc<DiscoveryEngine>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(VIEW_SWEEP_INTERVAL);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(error) = engine.prune_expired_views().await {
                tracing::warn!(
                    event_name = "views.sweep_failed",
                    error = %error,
                    "expired view sweep failed"
                );
            }
        }
    });
}
