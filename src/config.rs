use crate::error::{AppError, Result};
use crate::idempotency::RegistryConfig;
use crate::observability::{LogConfig, LogFormat};
use crate::tracker::TrackerConfig;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub registry: RegistrySettings,
    pub tracker: TrackerSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Deserialize)]
pub struct RegistrySettings {
    pub ttl_seconds: i64,
    pub max_entries: usize,
    /// Zero disables the background sweeper.
    pub sweep_interval_seconds: u64,
}

#[derive(Debug, Deserialize)]
pub struct TrackerSettings {
    pub max_cache_size: usize,
    pub message_ttl_seconds: i64,
    pub loop_threshold: u32,
}

#[derive(Debug, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
    pub format: String,
}

impl Settings {
    /// Loads defaults, then `config/default`, `config/local` and `APP__*`
    /// environment variables, each overriding the previous.
    pub fn new() -> Result<Self> {
        let builder = Self::builder_with_defaults()?
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Built-in defaults only.
    pub fn defaults() -> Result<Self> {
        let settings: Settings = Self::builder_with_defaults()?.build()?.try_deserialize()?;
        Ok(settings)
    }

    fn builder_with_defaults(
    ) -> std::result::Result<config::ConfigBuilder<config::builder::DefaultState>, config::ConfigError>
    {
        let registry = RegistryConfig::default();
        let tracker = TrackerConfig::default();

        config::Config::builder()
            .set_default("registry.ttl_seconds", registry.ttl_seconds)?
            .set_default("registry.max_entries", registry.max_entries as u64)?
            .set_default("registry.sweep_interval_seconds", 60u64)?
            .set_default("tracker.max_cache_size", tracker.max_cache_size as u64)?
            .set_default("tracker.message_ttl_seconds", tracker.message_ttl_seconds)?
            .set_default("tracker.loop_threshold", tracker.loop_threshold as u64)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")
    }

    pub fn validate(&self) -> Result<()> {
        self.registry_config().validate()?;
        self.tracker_config().validate()?;
        if self.logging.level.trim().is_empty() {
            return Err(AppError::Validation("logging level cannot be empty".to_string()));
        }
        Ok(())
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            ttl_seconds: self.registry.ttl_seconds,
            max_entries: self.registry.max_entries,
        }
    }

    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            max_cache_size: self.tracker.max_cache_size,
            message_ttl_seconds: self.tracker.message_ttl_seconds,
            loop_threshold: self.tracker.loop_threshold,
        }
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        match self.registry.sweep_interval_seconds {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            level: self.logging.level.clone(),
            format: LogFormat::from(self.logging.format.as_str()),
            ..LogConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_component_defaults() {
        let settings = Settings::defaults().unwrap();
        assert_eq!(settings.registry.ttl_seconds, 300);
        assert_eq!(settings.registry.max_entries, 10_000);
        assert_eq!(settings.tracker.loop_threshold, 5);
        assert_eq!(settings.tracker.message_ttl_seconds, 1800);
        assert_eq!(settings.sweep_interval(), Some(Duration::from_secs(60)));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_zero_sweep_interval_disables_sweeper() {
        let mut settings = Settings::defaults().unwrap();
        settings.registry.sweep_interval_seconds = 0;
        assert_eq!(settings.sweep_interval(), None);
    }

    #[test]
    fn test_validation_rejects_bad_registry() {
        let mut settings = Settings::defaults().unwrap();
        settings.registry.ttl_seconds = -5;
        assert!(matches!(settings.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_validation_rejects_oversized_ttls() {
        let mut settings = Settings::defaults().unwrap();
        settings.registry.ttl_seconds = 10_000_000_000_000;
        assert!(matches!(settings.validate(), Err(AppError::Validation(_))));

        let mut settings = Settings::defaults().unwrap();
        settings.tracker.message_ttl_seconds = 10_000_000_000_000;
        assert!(matches!(settings.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_log_config_mapping() {
        let mut settings = Settings::defaults().unwrap();
        settings.logging.format = "json".to_string();
        let log_config = settings.log_config();
        assert_eq!(log_config.format, LogFormat::Json);
        assert_eq!(log_config.level, "info");
    }
}
