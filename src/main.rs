use dedup_registry::config::Settings;
use dedup_registry::idempotency::{ExpirySweeper, IdempotencyRegistry};
use dedup_registry::observability::{init_logging, init_metrics};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = Settings::new()?;
    init_logging(&settings.log_config());
    info!("Configuration loaded");

    let _metrics = init_metrics()?;
    info!("Prometheus recorder installed");

    let registry = Arc::new(IdempotencyRegistry::new(settings.registry_config()));
    info!(
        "Idempotency registry ready (ttl: {}s, capacity: {})",
        registry.ttl().num_seconds(),
        registry.capacity()
    );

    let sweeper = settings.sweep_interval().map(|interval| {
        info!("Starting expiry sweeper every {:?}", interval);
        ExpirySweeper::new(Arc::clone(&registry), interval).start()
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    if let Some(sweeper) = sweeper {
        sweeper.shutdown().await;
    }

    info!(
        "Final registry stats: {}",
        serde_json::to_string(&registry.stats_snapshot())?
    );
    registry.clear();

    info!("Shutdown complete");
    Ok(())
}
