use crate::error::{AppError, Result};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Global metrics instance.
pub static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Metrics collector for deduplication activity. Recording is a no-op until
/// `init_metrics` installs the Prometheus recorder.
#[derive(Debug, Clone, Default)]
pub struct Metrics;

impl Metrics {
    pub fn new() -> Self {
        Self
    }

    /// True once the Prometheus recorder is installed.
    pub fn is_initialized(&self) -> bool {
        METRICS_HANDLE.get().is_some()
    }

    pub fn record_claim(&self, claimed: bool) {
        let outcome = if claimed { "claimed" } else { "duplicate" };
        counter!("dedup_claims_total", "outcome" => outcome).increment(1);
    }

    pub fn record_eviction(&self) {
        counter!("dedup_evictions_total").increment(1);
    }

    pub fn set_tracked_identifiers(&self, count: usize) {
        gauge!("dedup_tracked_identifiers").set(count as f64);
    }

    pub fn record_expired(&self, purged: usize) {
        counter!("dedup_expired_total").increment(purged as u64);
    }

    pub fn record_sweep(&self, duration_ms: f64) {
        histogram!("dedup_sweep_duration_ms").record(duration_ms);
    }

    pub fn record_tracker_decision(&self, decision: &'static str) {
        counter!("dedup_tracker_decisions_total", "decision" => decision).increment(1);
    }
}

/// Timer for measuring operation latency.
pub struct LatencyTimer {
    start: Instant,
}

impl LatencyTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for LatencyTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Installs the Prometheus recorder once and returns its handle.
pub fn init_metrics() -> Result<PrometheusHandle> {
    if let Some(handle) = METRICS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to install Prometheus recorder: {}", e)))?;
    describe_metrics();

    METRICS.get_or_init(Metrics::new);
    Ok(METRICS_HANDLE.get_or_init(|| handle).clone())
}

/// Describes all metrics for Prometheus.
fn describe_metrics() {
    describe_counter!("dedup_claims_total", Unit::Count, "Claims by outcome (claimed or duplicate)");
    describe_counter!("dedup_evictions_total", Unit::Count, "Identifiers evicted before expiry because the registry was full");
    describe_counter!("dedup_expired_total", Unit::Count, "Expired identifiers purged from the registry");
    describe_gauge!("dedup_tracked_identifiers", Unit::Count, "Identifiers currently held by the registry");
    describe_histogram!("dedup_sweep_duration_ms", Unit::Milliseconds, "Expiry sweep latency in milliseconds");
    describe_counter!("dedup_tracker_decisions_total", Unit::Count, "Webhook tracker decisions by outcome");
}

/// Returns the global metrics instance.
pub fn get_metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}
