pub mod clock;
pub mod config;
pub mod error;
pub mod idempotency;
pub mod observability;
pub mod tracker;

pub use error::{AppError, Result};
pub use idempotency::{IdempotencyRegistry, MessageMetadata, RegistryConfig};
pub use tracker::{InboundMessage, MessageTracker, ProcessingDecision};
