use crate::clock::{Clock, MonotonicClock};
use crate::error::{AppError, Result};
use crate::observability::{get_metrics, mask_sensitive};
use crate::tracker::keys::{content_fingerprint, scoped_key};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Longest accepted message TTL (7 days).
pub const MAX_MESSAGE_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;

/// Configuration for webhook message tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Maximum number of messages kept in memory.
    pub max_cache_size: usize,
    /// How long a message stays tracked after it was last seen.
    pub message_ttl_seconds: i64,
    /// Similar messages from one sender tolerated before a loop is declared.
    pub loop_threshold: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_cache_size: 1000,
            message_ttl_seconds: 1800, // 30 minutes
            loop_threshold: 5,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_cache_size == 0 {
            return Err(AppError::Validation(
                "tracker max_cache_size must be at least 1".to_string(),
            ));
        }
        if self.message_ttl_seconds <= 0 {
            return Err(AppError::Validation(
                "tracker message_ttl_seconds must be positive".to_string(),
            ));
        }
        if self.message_ttl_seconds > MAX_MESSAGE_TTL_SECONDS {
            return Err(AppError::Validation(format!(
                "tracker message_ttl_seconds must not exceed {}",
                MAX_MESSAGE_TTL_SECONDS
            )));
        }
        if self.loop_threshold == 0 {
            return Err(AppError::Validation(
                "tracker loop_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// A message delivered by a messaging instance webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub message_id: String,
    pub instance_name: String,
    pub remote_jid: String,
    pub content: String,
}

impl InboundMessage {
    pub fn new(
        message_id: impl Into<String>,
        instance_name: impl Into<String>,
        remote_jid: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            instance_name: instance_name.into(),
            remote_jid: remote_jid.into(),
            content: content.into(),
        }
    }
}

/// Tracked state of one delivered message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedMessage {
    pub message_id: String,
    pub instance_name: String,
    pub remote_jid: String,
    pub last_seen: DateTime<Utc>,
    pub content_hash: String,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingOutcome {
    pub is_processed: bool,
    pub is_duplicate: bool,
    pub is_loop_detected: bool,
    pub processing_count: u32,
    pub time_since_last_processed_ms: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    LoopDetected,
    Duplicate,
}

impl BlockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockReason::LoopDetected => "loop_detected",
            BlockReason::Duplicate => "duplicate",
        }
    }
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockReason::LoopDetected => {
                write!(f, "loop detected: too many similar messages in a short period")
            }
            BlockReason::Duplicate => write!(f, "duplicate message: already processed"),
        }
    }
}

/// Whether a webhook message may be processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingDecision {
    pub can_process: bool,
    pub reason: Option<BlockReason>,
    pub processing_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PotentialLoop {
    pub instance_name: String,
    pub remote_jid: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerStats {
    pub total_tracked: usize,
    pub instance_counts: BTreeMap<String, u64>,
    pub potential_loops: Vec<PotentialLoop>,
}

#[derive(Debug, Default)]
struct TrackerState {
    messages: HashMap<String, ProcessedMessage>,
    /// instance -> remote jid -> messages seen
    sender_counts: HashMap<String, HashMap<String, u64>>,
}

impl TrackerState {
    fn cleanup(&mut self, now: DateTime<Utc>, ttl: Duration) -> usize {
        let expired: Vec<String> = self
            .messages
            .iter()
            .filter(|(_, message)| now - message.last_seen > ttl)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            if let Some(message) = self.messages.remove(key) {
                if let Some(counters) = self.sender_counts.get_mut(&message.instance_name) {
                    counters.remove(&message.remote_jid);
                    if counters.is_empty() {
                        self.sender_counts.remove(&message.instance_name);
                    }
                }
            }
        }

        expired.len()
    }

    /// Drops the least recently seen message and releases its sender counter.
    fn evict_least_recent(&mut self) -> Option<ProcessedMessage> {
        let key = self
            .messages
            .iter()
            .min_by_key(|(_, message)| message.last_seen)
            .map(|(key, _)| key.clone())?;
        let evicted = self.messages.remove(&key)?;

        if let Some(counters) = self.sender_counts.get_mut(&evicted.instance_name) {
            if let Some(count) = counters.get_mut(&evicted.remote_jid) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    counters.remove(&evicted.remote_jid);
                }
            }
            if counters.is_empty() {
                self.sender_counts.remove(&evicted.instance_name);
            }
        }
        Some(evicted)
    }

    fn similar_count(&self, instance_name: &str, remote_jid: &str, content_hash: &str) -> usize {
        self.messages
            .values()
            .filter(|m| {
                m.instance_name == instance_name
                    && m.remote_jid == remote_jid
                    && m.content_hash == content_hash
            })
            .count()
    }
}

/// Anti-loop tracking for inbound webhook messages.
///
/// Messages are keyed by `instance:message_id`. A repeated key is a duplicate;
/// the same content from the same sender arriving under many different ids is a
/// loop. Entries are forgotten once idle for longer than the TTL, and seeing a
/// duplicate refreshes that idle timer.
pub struct MessageTracker {
    state: Mutex<TrackerState>,
    config: TrackerConfig,
    clock: Arc<dyn Clock>,
}

impl MessageTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self::with_clock(config, Arc::new(MonotonicClock::new()))
    }

    pub fn with_clock(config: TrackerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(TrackerState::default()),
            config,
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ttl(&self) -> Duration {
        Duration::seconds(self.config.message_ttl_seconds.clamp(0, MAX_MESSAGE_TTL_SECONDS))
    }

    /// Records a delivery and reports what has been seen before.
    pub fn track(&self, message: &InboundMessage) -> TrackingOutcome {
        let now = self.clock.now();
        let ttl = self.ttl();
        let key = scoped_key(&message.instance_name, &message.message_id);
        let mut state = self.lock();

        state.cleanup(now, ttl);

        if let Some(existing) = state.messages.get_mut(&key) {
            let since = now - existing.last_seen;
            existing.count += 1;
            existing.last_seen = now;

            return TrackingOutcome {
                is_processed: true,
                is_duplicate: true,
                is_loop_detected: existing.count > self.config.loop_threshold,
                processing_count: existing.count,
                time_since_last_processed_ms: Some(since.num_milliseconds()),
            };
        }

        if state.messages.len() >= self.config.max_cache_size.max(1) {
            if let Some(evicted) = state.evict_least_recent() {
                tracing::debug!(
                    "Tracker cache full, dropped {}:{}",
                    evicted.instance_name,
                    evicted.message_id
                );
            }
        }

        *state
            .sender_counts
            .entry(message.instance_name.clone())
            .or_default()
            .entry(message.remote_jid.clone())
            .or_insert(0) += 1;

        let content_hash = content_fingerprint(&message.content);
        let threshold = self.config.loop_threshold as usize;
        let is_loop_detected =
            state.similar_count(&message.instance_name, &message.remote_jid, &content_hash)
                >= threshold;

        state.messages.insert(
            key,
            ProcessedMessage {
                message_id: message.message_id.clone(),
                instance_name: message.instance_name.clone(),
                remote_jid: message.remote_jid.clone(),
                last_seen: now,
                content_hash,
                count: 1,
            },
        );

        TrackingOutcome {
            is_processed: false,
            is_duplicate: false,
            is_loop_detected,
            processing_count: 1,
            time_since_last_processed_ms: None,
        }
    }

    /// Decides whether a webhook message should be processed.
    pub fn check(&self, message: &InboundMessage) -> ProcessingDecision {
        let outcome = self.track(message);

        let reason = if outcome.is_loop_detected {
            tracing::warn!(
                "Loop detected on instance {} from {} (count: {})",
                message.instance_name,
                mask_sensitive(&message.remote_jid, 4),
                outcome.processing_count
            );
            Some(BlockReason::LoopDetected)
        } else if outcome.is_duplicate {
            tracing::debug!(
                "Duplicate message {} on instance {}",
                message.message_id,
                message.instance_name
            );
            Some(BlockReason::Duplicate)
        } else {
            None
        };

        get_metrics().record_tracker_decision(reason.map_or("processed", |r| r.as_str()));

        ProcessingDecision {
            can_process: reason.is_none(),
            reason,
            processing_count: outcome.processing_count,
        }
    }

    /// Drops messages idle for longer than the TTL.
    pub fn cleanup_expired(&self) -> usize {
        let now = self.clock.now();
        let ttl = self.ttl();
        let mut state = self.lock();
        let removed = state.cleanup(now, ttl);
        tracing::debug!(
            "Tracker cleanup complete, {} removed, {} tracked",
            removed,
            state.messages.len()
        );
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> TrackerStats {
        let state = self.lock();
        let loop_floor = u64::from(self.config.loop_threshold.saturating_sub(1));

        let mut instance_counts = BTreeMap::new();
        let mut potential_loops = Vec::new();

        for (instance_name, counters) in &state.sender_counts {
            let mut total = 0;
            for (remote_jid, count) in counters {
                total += count;
                if *count >= loop_floor {
                    potential_loops.push(PotentialLoop {
                        instance_name: instance_name.clone(),
                        remote_jid: remote_jid.clone(),
                        count: *count,
                    });
                }
            }
            instance_counts.insert(instance_name.clone(), total);
        }

        potential_loops.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.instance_name.cmp(&b.instance_name))
                .then_with(|| a.remote_jid.cmp(&b.remote_jid))
        });

        TrackerStats {
            total_tracked: state.messages.len(),
            instance_counts,
            potential_loops,
        }
    }
}

impl Default for MessageTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}
