#![allow(dead_code)]

use dedup_registry::clock::ManualClock;
use dedup_registry::idempotency::{IdempotencyRegistry, RegistryConfig};
use dedup_registry::tracker::{MessageTracker, TrackerConfig};
use std::sync::Arc;

pub fn registry_with_clock(ttl_seconds: i64) -> (IdempotencyRegistry, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::at_epoch());
    let config = RegistryConfig {
        ttl_seconds,
        ..RegistryConfig::default()
    };
    (IdempotencyRegistry::with_clock(config, clock.clone()), clock)
}

pub fn tracker_with_clock(config: TrackerConfig) -> (MessageTracker, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::at_epoch());
    (MessageTracker::with_clock(config, clock.clone()), clock)
}
