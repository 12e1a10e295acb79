//! Error types for the sms-triage library.
//!
//! Store operations surface typed failures through [`TriageError`]. Read
//! paths report absence as `Ok(None)` / `Ok(false)`; `NotFound` is reserved
//! for writes aimed at a row that no longer exists.

use thiserror::Error;

/// Errors that can occur while storing, overriding or serving verdicts.
#[derive(Error, Debug)]
pub enum TriageError {
    /// Override/update target is absent (stale reference)
    #[error("{entity} not found: {key}")]
    NotFound {
        /// Kind of row that was looked up
        entity: &'static str,
        /// Id or phone number used for the lookup
        key: String,
    },

    /// A required field is missing or out of range, or the store rejected the row
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// The store could not begin or commit; everything was rolled back
    #[error("Transaction failed: {0}")]
    TransactionFailure(String),

    /// The external classifier could not produce a verdict
    #[error("Classifier unavailable: {0}")]
    ClassifierUnavailable(String),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(rusqlite::Error),

    /// Connection pool errors
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV export errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A blocking query task panicked or was cancelled by the runtime
    #[error("Background task failed: {0}")]
    Task(String),
}

/// Convenience type alias for Result with `TriageError`
pub type Result<T> = std::result::Result<T, TriageError>;

impl TriageError {
    /// Shorthand for a missing message row
    #[must_use]
    pub fn message_not_found(id: i64) -> Self {
        Self::NotFound {
            entity: "message",
            key: id.to_string(),
        }
    }

    /// Shorthand for a missing allow-list row
    #[must_use]
    pub fn sender_not_found(key: impl ToString) -> Self {
        Self::NotFound {
            entity: "allowed sender",
            key: key.to_string(),
        }
    }

    /// Wrap a begin/commit failure
    pub(crate) fn transaction(err: &rusqlite::Error) -> Self {
        Self::TransactionFailure(err.to_string())
    }

    /// Returns true for failures the caller may simply retry
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TransactionFailure(_) | Self::ClassifierUnavailable(_))
    }
}

impl From<rusqlite::Error> for TriageError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref code, _)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Self::ConstraintViolation(err.to_string())
            }
            rusqlite::Error::SqliteFailure(ref code, _)
                if matches!(
                    code.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                ) =>
            {
                Self::TransactionFailure(err.to_string())
            }
            other => Self::Database(other),
        }
    }
}

impl From<config::ConfigError> for TriageError {
    fn from(err: config::ConfigError) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}

impl From<tokio::task::JoinError> for TriageError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}
