use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TriageError};

/// Application configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Store location and pool sizing
    pub database: DatabaseConfig,
    /// Log level, format and optional file
    pub logging: LoggingConfig,
    /// Decision engine retry and failure policy
    pub engine: EngineConfig,
    /// Built-in keyword classifier settings
    pub classifier: ClassifierConfig,
    /// Retention sweep settings
    pub retention: RetentionConfig,
}

/// SQLite store settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database file path
    pub path: String,
    /// Pool size
    pub max_connections: u32,
    /// How long to wait for a pooled connection
    pub connection_timeout_secs: u64,
    /// How long SQLite waits on a locked database before failing
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/sms_triage.db".to_string(),
            max_connections: 8,
            connection_timeout_secs: 30,
            busy_timeout_ms: 5_000,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `sms_triage=debug`
    pub level: String,
    /// Optional log file; rotated daily
    pub file_path: Option<String>,
    /// "json" or "text"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_path: None,
            format: "text".to_string(),
        }
    }
}

/// What to persist when the classifier keeps failing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Store an `UNKNOWN` / `CLASSIFIER_UNAVAILABLE` row that is not blocked
    #[default]
    MarkUnknown,
    /// Store nothing and return the error to the caller
    Reject,
}

/// Decision engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Extra attempts after the first classifier failure
    pub classifier_retries: u32,
    /// Delay before the first retry; doubled for each further retry
    pub retry_backoff_ms: u64,
    /// Outcome once retries are exhausted
    pub failure_policy: FailurePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            classifier_retries: 2,
            retry_backoff_ms: 100,
            failure_policy: FailurePolicy::MarkUnknown,
        }
    }
}

impl EngineConfig {
    /// Backoff before retry number `attempt` (1-based)
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1_u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor))
    }
}

/// Keyword classifier settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Minimum confidence at which junk is blocked
    pub block_threshold: f64,
    /// Extra keywords that always mark a message as spam
    pub custom_keywords: Vec<String>,
    /// Extra case-insensitive patterns that always mark a message as spam
    pub custom_patterns: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            block_threshold: 0.7,
            custom_keywords: Vec::new(),
            custom_patterns: Vec::new(),
        }
    }
}

/// Retention settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Messages older than this many days are swept
    pub max_age_days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { max_age_days: 90 }
    }
}

impl RetentionConfig {
    /// Retention window as a duration
    #[must_use]
    pub fn max_age(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.max_age_days))
    }
}

fn invalid(msg: impl Into<String>) -> TriageError {
    TriageError::InvalidConfig(msg.into())
}

impl AppConfig {
    /// Load configuration from multiple sources with precedence
    ///
    /// Defaults, then `config/default.*`, then `config/local.*`, then
    /// `SMS_TRIAGE__SECTION__KEY` environment variables.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Like [`AppConfig::load`], with an extra file layered after `config/local`
    pub fn load_from(extra: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder()
            .add_source(Config::try_from(&Self::default())?)
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false));
        if let Some(path) = extra {
            builder = builder.add_source(File::from(path).required(true));
        }
        let config = builder
            .add_source(
                Environment::with_prefix("SMS_TRIAGE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let app_config: Self = config.try_deserialize()?;
        app_config.validate()?;
        Ok(app_config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.database.path.trim().is_empty() {
            return Err(invalid("database.path must not be empty"));
        }
        if self.database.max_connections == 0 {
            return Err(invalid("database.max_connections must be greater than 0"));
        }
        if self.database.connection_timeout_secs == 0 {
            return Err(invalid("database.connection_timeout_secs must be greater than 0"));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(invalid(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                self.logging.level
            )));
        }
        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(invalid(format!(
                "Invalid log format: {}. Must be one of: {valid_formats:?}",
                self.logging.format
            )));
        }

        if self.engine.classifier_retries > 10 {
            return Err(invalid("engine.classifier_retries must be at most 10"));
        }

        let threshold = self.classifier.block_threshold;
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            return Err(invalid(format!(
                "classifier.block_threshold must be within [0, 1], got {threshold}"
            )));
        }

        if self.retention.max_age_days == 0 {
            return Err(invalid("retention.max_age_days must be greater than 0"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.database.path, "data/sms_triage.db");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.engine.failure_policy, FailurePolicy::MarkUnknown);
        assert_eq!(config.retention.max_age_days, 90);
    }

    #[test]
    fn test_config_validation() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let mut config = AppConfig::default();
        config.database.max_connections = 0;
        assert!(matches!(config.validate(), Err(TriageError::InvalidConfig(_))));

        let mut config = AppConfig::default();
        config.classifier.block_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn backoff_doubles() {
        let engine = EngineConfig {
            retry_backoff_ms: 50,
            ..EngineConfig::default()
        };
        assert_eq!(engine.backoff(1), Duration::from_millis(50));
        assert_eq!(engine.backoff(2), Duration::from_millis(100));
        assert_eq!(engine.backoff(3), Duration::from_millis(200));
    }

    #[test]
    fn failure_policy_uses_snake_case() {
        let policy: FailurePolicy = serde_json::from_str("\"reject\"").unwrap();
        assert_eq!(policy, FailurePolicy::Reject);
        assert_eq!(
            serde_json::to_string(&FailurePolicy::MarkUnknown).unwrap(),
            "\"mark_unknown\""
        );
    }
}
