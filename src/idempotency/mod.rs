pub mod identity;
pub mod registry;
pub mod stats;
pub mod sweeper;

pub use identity::{
    EntropySource, IdGenerator, MessageMetadata, OsEntropy, IDEMPOTENCY_KEY_HEADER,
    MESSAGE_ID_HEADER, MESSAGE_TIMESTAMP_HEADER,
};
pub use registry::{IdempotencyRegistry, RegistryConfig, TrackedIdentifier, MAX_TTL_SECONDS};
pub use stats::{RegistryStats, StatsSnapshot};
pub use sweeper::{ExpirySweeper, SweeperHandle};
