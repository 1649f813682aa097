use thiserror::Error;

/// Errors surfaced by the deduplication layer.
///
/// Registry lookups and registrations are total and never produce one of these;
/// only identifier generation and the ambient setup code can fail.
#[derive(Debug, Error)]
pub enum AppError {
    /// The entropy source could not produce random bytes. Fatal for the
    /// current send attempt and never retried.
    #[error("Entropy source exhausted: {0}")]
    EntropyExhausted(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::EntropyExhausted(_))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entropy_error_is_fatal() {
        let err = AppError::EntropyExhausted("getrandom failed".to_string());
        assert!(err.is_fatal());
        assert_eq!(err.to_string(), "Entropy source exhausted: getrandom failed");
    }

    #[test]
    fn test_validation_error_is_not_fatal() {
        let err = AppError::Validation("ttl_seconds must be positive".to_string());
        assert!(!err.is_fatal());
    }
}
