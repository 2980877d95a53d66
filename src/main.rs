//! vehicle_sync binary entry point

use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vehicle_sync::{config::AppConfig, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;
    init_tracing(&config.logging.format);

    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        base_url = %config.fetch.base_url,
        max_attempts = config.fetch.max_attempts,
        "Configuration loaded"
    );

    let state = AppState::from_config(&config)
        .await
        .context("failed to initialize application state")?;

    if config.sync.run_on_startup {
        // serving continues with the previously stored data
        if let Err(error) = state.sync.sync_all().await {
            tracing::warn!(%error, "Startup vehicle sync failed");
        }
    }

    spawn_cache_purge_task(&state, config.cache.cleanup_interval_seconds);
    if config.sync.interval_seconds > 0 {
        spawn_sync_task(&state, config.sync.interval_seconds);
    }

    let app = vehicle_sync::build_router(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

fn init_tracing(format: &str) {
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "vehicle_sync=info,tower_http=debug".into())
    };

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter())
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter())
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }
}

fn spawn_cache_purge_task(state: &AppState, interval_secs: u64) {
    let cache = state.query.cache().clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        interval.tick().await;

        loop {
            interval.tick().await;
            let removed = cache.purge_expired();
            if removed > 0 {
                tracing::debug!(removed, "purged expired cache entries");
            }
        }
    });
}

fn spawn_sync_task(state: &AppState, interval_secs: u64) {
    let sync = state.sync.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        // the first tick fires immediately; the startup sync is handled separately
        interval.tick().await;

        loop {
            interval.tick().await;
            tracing::info!("Running scheduled vehicle sync...");
            if let Err(error) = sync.sync_all().await {
                tracing::error!(%error, "Scheduled vehicle sync failed");
            }
        }
    });

    tracing::info!(interval_secs, "Periodic sync task spawned");
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
