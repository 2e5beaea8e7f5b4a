use std::{io::ErrorKind, sync::Arc, time::Duration};

use harvester_common::{HarvesterError, Result, RetryPolicy};
use harvester_storage::{Backend, FileBackend, MemoryBackend, MetricStore, PgBackend};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::{info, warn};

use crate::config::{ServerConfig, StorageConfig};

/// Builds the configured backend and wraps it in a store.
pub async fn open_store(config: &ServerConfig, retry: &RetryPolicy) -> Result<Arc<MetricStore>> {
    let backend: Arc<dyn Backend> = match &config.storage {
        StorageConfig::Postgres { dsn } => {
            let backend = retry
                .run(
                    "connect database",
                    move || PgBackend::connect(dsn),
                    |err| matches!(err, HarvesterError::ConnectionException(_)),
                )
                .await?;
            Arc::new(backend)
        }
        StorageConfig::File { path } => Arc::new(FileBackend::new(path.clone())),
        StorageConfig::Memory => Arc::new(MemoryBackend::new()),
    };

    info!(
        backend = backend.name(),
        save_on_write = config.save_on_write(),
        "metric store opened"
    );
    Ok(Arc::new(MetricStore::new(backend, config.save_on_write())))
}

/// Loads the persisted snapshot. Failures are logged and the store starts empty.
pub async fn restore(store: &MetricStore, retry: &RetryPolicy) {
    let result = retry
        .run("restore metrics", move || store.read(), |err| store.is_transient(err))
        .await;

    match result {
        Ok(()) => {}
        Err(HarvesterError::Io(err)) if err.kind() == ErrorKind::NotFound => {
            info!("no persisted metrics to restore");
        }
        Err(err) => warn!(error = %err, "failed to read initial metric values"),
    }
}

/// Saves with retry. Used for periodic and final flushes.
pub async fn flush(store: &MetricStore, retry: &RetryPolicy) -> Result<()> {
    retry
        .run("save metrics", move || store.save(), |err| store.is_transient(err))
        .await
}

/// Periodic flush task. Each tick retries on its own; a failed tick only logs.
pub fn spawn_flusher(
    store: Arc<MetricStore>,
    period: Duration,
    retry: RetryPolicy,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match flush(&store, &retry).await {
                Ok(()) => info!("metrics saved"),
                Err(err) => warn!(error = %err, "failed to save metrics"),
            }
        }
    })
}
