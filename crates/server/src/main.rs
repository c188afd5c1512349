use std::time::Duration;

use anyhow::Result;
use haggle_core::config::{AppConfig, LoadOptions};
use haggle_server::bootstrap::bootstrap_with_config;

fn init_logging(config: &AppConfig) {
    use haggle_core::config::LogFormat::*;
    use tracing::Level;

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

async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap_with_config(config).await?;
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    let sweeper = if app.config.sweeper.enabled {
        tracing::info!(
            event_name = "system.server.sweeper_started",
            correlation_id = "bootstrap",
            interval_secs = app.config.sweeper.interval_secs,
            "expiration sweeper started"
        );
        Some(app.sweeper.clone().spawn())
    } else {
        tracing::warn!(
            event_name = "system.server.sweeper_disabled",
            correlation_id = "bootstrap",
            "expiration sweeper disabled by configuration"
        );
        None
    };

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "haggle-server listening"
    );
    axum::serve(listener, app.router()).with_graceful_shutdown(wait_for_shutdown()).await?;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "haggle-server stopping"
    );
    if let Some(handle) = sweeper {
        let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
        if tokio::time::timeout(grace, handle.stop()).await.is_err() {
            tracing::warn!(
                event_name = "system.server.sweeper_stop_timeout",
                correlation_id = "shutdown",
                grace_secs = grace.as_secs(),
                "expiration sweeper did not stop within the grace period"
            );
        }
    }
    app.db_pool.close().await;

    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(
            event_name = "system.server.signal_error",
            correlation_id = "shutdown",
            error = %error,
            "failed to listen for shutdown signal"
        );
        std::future::pending::<()>().await;
    }
}
