use crate::idempotency::registry::IdempotencyRegistry;
use crate::observability::{get_metrics, LatencyTimer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Background purge of expired identifiers.
///
/// The registry already drops expired entries on every registration, so this
/// only bounds how long idle expired entries keep their memory.
pub struct ExpirySweeper {
    registry: Arc<IdempotencyRegistry>,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(registry: Arc<IdempotencyRegistry>, interval: Duration) -> Self {
        Self { registry, interval }
    }

    /// Runs one sweep.
    pub fn run_once(&self) -> usize {
        let timer = LatencyTimer::new();
        let count = self.registry.purge_expired();
        get_metrics().record_sweep(timer.elapsed_ms());
        count
    }

    /// Starts the sweeper in a background task.
    pub fn start(self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            // The first tick completes immediately.
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let count = self.run_once();
                        if count > 0 {
                            tracing::info!("Purged {} expired identifiers", count);
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            tracing::debug!("Expiry sweeper stopped");
        });

        SweeperHandle {
            shutdown_tx,
            task: Some(task),
        }
    }
}

/// Owner of a running sweeper. Dropping it aborts the task.
pub struct SweeperHandle {
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Signals the sweeper and waits for it to exit.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    tracing::error!("Expiry sweeper terminated abnormally: {}", e);
                }
            }
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
