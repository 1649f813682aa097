use crate::clock::{Clock, MonotonicClock};
use crate::error::{AppError, Result};
use crate::idempotency::identity::{IdGenerator, MessageMetadata};
use crate::idempotency::stats::{RegistryStats, StatsSnapshot};
use crate::observability::{get_metrics, mask_id};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Longest accepted TTL (7 days).
pub const MAX_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;

/// Configuration for the idempotency registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub ttl_seconds: i64,
    pub max_entries: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 300, // 5 minutes
            max_entries: 10_000,
        }
    }
}

impl RegistryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.ttl_seconds <= 0 {
            return Err(AppError::Validation(
                "registry ttl_seconds must be positive".to_string(),
            ));
        }
        if self.ttl_seconds > MAX_TTL_SECONDS {
            return Err(AppError::Validation(format!(
                "registry ttl_seconds must not exceed {}",
                MAX_TTL_SECONDS
            )));
        }
        if self.max_entries == 0 {
            return Err(AppError::Validation(
                "registry max_entries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// TTL clamped to `0..=MAX_TTL_SECONDS` for configs that skipped `validate`.
    pub fn ttl(&self) -> Duration {
        Duration::seconds(self.ttl_seconds.clamp(0, MAX_TTL_SECONDS))
    }
}

/// An identifier currently held by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedIdentifier {
    pub id: String,
    pub inserted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl TrackedIdentifier {
    fn new(id: String, inserted_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            id,
            inserted_at,
            expires_at: inserted_at
                .checked_add_signed(ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Tracked set plus a min-heap of expiry times. Every entry in `entries` has
/// exactly one heap node with the same `expires_at`.
#[derive(Debug, Default)]
struct RegistryState {
    entries: HashMap<String, TrackedIdentifier>,
    expiry_index: BinaryHeap<Reverse<(DateTime<Utc>, String)>>,
}

impl RegistryState {
    fn live(&self, id: &str, now: DateTime<Utc>) -> Option<&TrackedIdentifier> {
        self.entries.get(id).filter(|entry| !entry.is_expired_at(now))
    }

    /// Pops every heap node due at or before `now`, dropping the matching entry.
    fn purge(&mut self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        while let Some(Reverse((expires_at, _))) = self.expiry_index.peek() {
            if *expires_at > now {
                break;
            }
            if let Some(Reverse((expires_at, id))) = self.expiry_index.pop() {
                if self.remove_if_matches(&id, expires_at) {
                    removed += 1;
                }
            }
        }
        removed
    }

    /// Drops the entry nearest to expiry.
    fn evict_oldest(&mut self) -> Option<String> {
        while let Some(Reverse((expires_at, id))) = self.expiry_index.pop() {
            if self.remove_if_matches(&id, expires_at) {
                return Some(id);
            }
        }
        None
    }

    fn remove_if_matches(&mut self, id: &str, expires_at: DateTime<Utc>) -> bool {
        match self.entries.get(id) {
            Some(entry) if entry.expires_at == expires_at => {
                self.entries.remove(id);
                true
            }
            _ => false,
        }
    }

    fn insert(&mut self, entry: TrackedIdentifier) {
        self.expiry_index
            .push(Reverse((entry.expires_at, entry.id.clone())));
        self.entries.insert(entry.id.clone(), entry);
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.expiry_index.clear();
    }
}

/// In-memory registry of recently seen message identifiers.
///
/// An identifier registered at `t` is a duplicate for `[t, t + ttl)` and is
/// forgotten afterwards. Repeated registrations or lookups never extend the
/// window. All decisions happen under a single lock, so `claim` is an atomic
/// check-and-set.
pub struct IdempotencyRegistry {
    state: Mutex<RegistryState>,
    config: RegistryConfig,
    clock: Arc<dyn Clock>,
    generator: IdGenerator,
    stats: Arc<RegistryStats>,
}

impl IdempotencyRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self::with_parts(config, Arc::new(MonotonicClock::new()), IdGenerator::os())
    }

    pub fn with_clock(config: RegistryConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_parts(config, clock, IdGenerator::os())
    }

    pub fn with_parts(config: RegistryConfig, clock: Arc<dyn Clock>, generator: IdGenerator) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            config,
            clock,
            generator,
            stats: Arc::new(RegistryStats::new()),
        }
    }

    // Expiry arithmetic saturates, so no mutation panics while holding the lock.
    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn ttl(&self) -> Duration {
        self.config.ttl()
    }

    pub fn capacity(&self) -> usize {
        self.config.max_entries.max(1)
    }

    pub fn stats(&self) -> Arc<RegistryStats> {
        Arc::clone(&self.stats)
    }

    pub fn stats_snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Generates a new globally unique identifier.
    pub fn generate_id(&self) -> Result<String> {
        self.generator.generate()
    }

    /// Mints a fresh attempt/message identity pair stamped with the current time.
    pub fn create_metadata(&self) -> Result<MessageMetadata> {
        MessageMetadata::new(&self.generator, self.clock.now())
    }

    /// Returns true while `id` is registered and not yet expired.
    pub fn is_duplicate(&self, id: &str) -> bool {
        let now = self.clock.now();
        self.lock().live(id, now).is_some()
    }

    /// Returns the live entry for `id`, if any.
    pub fn tracked(&self, id: &str) -> Option<TrackedIdentifier> {
        let now = self.clock.now();
        self.lock().live(id, now).cloned()
    }

    /// Records `id` for one TTL window. Registering a tracked identifier again
    /// keeps the original expiry.
    pub fn register(&self, id: &str) {
        if self.insert_if_absent(id) {
            tracing::debug!("Registered identifier {}", mask_id(id));
        }
    }

    /// Atomically registers `id` if it is not tracked.
    ///
    /// Returns true iff this call performed the registration. Among concurrent
    /// callers racing on the same fresh identifier exactly one gets true.
    pub fn claim(&self, id: &str) -> bool {
        self.stats.record_claim();
        let claimed = self.insert_if_absent(id);
        if claimed {
            tracing::debug!("Claimed identifier {}", mask_id(id));
        } else {
            self.stats.record_duplicate();
            tracing::debug!("Duplicate identifier {} suppressed", mask_id(id));
        }
        get_metrics().record_claim(claimed);
        claimed
    }

    fn insert_if_absent(&self, id: &str) -> bool {
        let now = self.clock.now();
        let capacity = self.capacity();
        let mut state = self.lock();

        let expired = state.purge(now);
        self.record_expired(expired);

        if state.entries.contains_key(id) {
            return false;
        }

        if state.entries.len() >= capacity {
            if let Some(evicted) = state.evict_oldest() {
                self.stats.record_evicted();
                get_metrics().record_eviction();
                tracing::warn!(
                    "Registry at capacity ({}), evicted identifier {} before its TTL",
                    capacity,
                    mask_id(&evicted)
                );
            }
        }

        state.insert(TrackedIdentifier::new(id.to_string(), now, self.config.ttl()));
        self.stats.record_registration();
        get_metrics().set_tracked_identifiers(state.entries.len());
        true
    }

    fn record_expired(&self, count: usize) {
        if count > 0 {
            self.stats.record_expired(count as u64);
            get_metrics().record_expired(count);
        }
    }

    /// Removes every expired entry and returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut state = self.lock();
        let removed = state.purge(now);
        self.record_expired(removed);
        get_metrics().set_tracked_identifiers(state.entries.len());
        removed
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every tracked identifier.
    pub fn clear(&self) {
        let mut state = self.lock();
        let dropped = state.entries.len();
        state.clear();
        get_metrics().set_tracked_identifiers(0);
        tracing::info!("Idempotency registry cleared ({} identifiers dropped)", dropped);
    }
}

impl Default for IdempotencyRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl std::fmt::Debug for IdempotencyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdempotencyRegistry")
            .field("config", &self.config)
            .field("tracked", &self.len())
            .finish_non_exhaustive()
    }
}
