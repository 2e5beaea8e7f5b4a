mod config;
mod persistence;

use anyhow::Context;
use harvester_api::{AppState, metrics_router};
use harvester_common::RetryPolicy;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env_and_args()?;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let retry = RetryPolicy::default();
    let store = persistence::open_store(&config, &retry)
        .await
        .context("failed to open metric storage")?;

    if config.restore {
        persistence::restore(&store, &retry).await;
    }

    let flusher = config
        .store_interval
        .map(|period| persistence::spawn_flusher(store.clone(), period, retry.clone()));

    let app = metrics_router(AppState::new(store.clone(), config.key.clone()));
    let listener = tokio::net::TcpListener::bind(&config.address)
        .await
        .with_context(|| format!("failed to bind {}", config.address))?;
    info!(
        address = %config.address,
        backend = store.backend_name(),
        signed = config.key.is_some(),
        "harvester server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(flusher) = flusher {
        flusher.abort();
    }
    persistence::flush(&store, &retry)
        .await
        .context("failed to store metrics on shutdown")?;
    info!("metrics saved, server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
