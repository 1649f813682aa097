pub mod keys;
pub mod message_tracker;

pub use keys::{content_fingerprint, normalize_content, scoped_key};
pub use message_tracker::{
    BlockReason, InboundMessage, MessageTracker, PotentialLoop, ProcessedMessage,
    ProcessingDecision, TrackerConfig, TrackerStats, TrackingOutcome, MAX_MESSAGE_TTL_SECONDS,
};
