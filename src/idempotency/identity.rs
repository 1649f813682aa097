use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Builder;

pub const IDEMPOTENCY_KEY_HEADER: &str = "X-Idempotency-Key";
pub const MESSAGE_ID_HEADER: &str = "X-Message-ID";
pub const MESSAGE_TIMESTAMP_HEADER: &str = "X-Message-Timestamp";

/// Source of random bytes for identifier generation.
pub trait EntropySource: Send + Sync {
    fn fill(&self, buf: &mut [u8]) -> Result<()>;
}

/// Operating system CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill(&self, buf: &mut [u8]) -> Result<()> {
        getrandom::getrandom(buf).map_err(|e| AppError::EntropyExhausted(e.to_string()))
    }
}

/// Mints random version 4 UUIDs (122 random bits each).
#[derive(Clone)]
pub struct IdGenerator {
    entropy: Arc<dyn EntropySource>,
}

impl IdGenerator {
    pub fn new(entropy: Arc<dyn EntropySource>) -> Self {
        Self { entropy }
    }

    pub fn os() -> Self {
        Self::new(Arc::new(OsEntropy))
    }

    /// Generates a new identifier in hyphenated UUID form.
    pub fn generate(&self) -> Result<String> {
        let mut bytes = [0u8; 16];
        self.entropy.fill(&mut bytes)?;
        Ok(Builder::from_random_bytes(bytes).into_uuid().to_string())
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::os()
    }
}

impl std::fmt::Debug for IdGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdGenerator").finish_non_exhaustive()
    }
}

/// Identity pair for one send attempt of a logical message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    /// Unique per send attempt.
    pub attempt_id: String,
    /// Stable across retries of the same logical message.
    pub original_message_id: String,
    pub timestamp: DateTime<Utc>,
}

impl MessageMetadata {
    pub fn new(generator: &IdGenerator, timestamp: DateTime<Utc>) -> Result<Self> {
        Ok(Self {
            attempt_id: generator.generate()?,
            original_message_id: generator.generate()?,
            timestamp,
        })
    }

    /// Metadata for a retry: fresh attempt id, same logical message.
    pub fn retry(&self, generator: &IdGenerator, timestamp: DateTime<Utc>) -> Result<Self> {
        Ok(Self {
            attempt_id: generator.generate()?,
            original_message_id: self.original_message_id.clone(),
            timestamp,
        })
    }

    /// Headers attached to the upstream request so the receiver can
    /// deduplicate retries of the same logical message.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        vec![
            (IDEMPOTENCY_KEY_HEADER, self.original_message_id.clone()),
            (MESSAGE_ID_HEADER, self.attempt_id.clone()),
            (
                MESSAGE_TIMESTAMP_HEADER,
                self.timestamp.timestamp_millis().to_string(),
            ),
        ]
    }
}
