use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for registry activity.
#[derive(Debug, Default)]
pub struct RegistryStats {
    pub claims: AtomicU64,
    pub duplicates: AtomicU64,
    pub registrations: AtomicU64,
    pub expired: AtomicU64,
    pub evicted: AtomicU64,
}

impl RegistryStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_claim(&self) {
        self.claims.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_registration(&self) {
        self.registrations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expired(&self, count: u64) {
        self.expired.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_evicted(&self) {
        self.evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn duplicate_rate(&self) -> f64 {
        self.snapshot().duplicate_rate()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            claims: self.claims.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            registrations: self.registrations.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub claims: u64,
    pub duplicates: u64,
    pub registrations: u64,
    pub expired: u64,
    pub evicted: u64,
}

impl StatsSnapshot {
    /// Share of claims that hit an already tracked identifier.
    pub fn duplicate_rate(&self) -> f64 {
        if self.claims == 0 {
            0.0
        } else {
            self.duplicates as f64 / self.claims as f64
        }
    }
}
