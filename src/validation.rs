use std::path::Path;

use crate::error::{Result, TriageError};

/// Longest sender identifier accepted (phone numbers, short codes, alphanumeric ids)
pub const MAX_SENDER_LEN: usize = 64;
/// Longest display name accepted for an allow-list entry
pub const MAX_DISPLAY_NAME_LEN: usize = 100;

fn violation(msg: impl Into<String>) -> TriageError {
    TriageError::ConstraintViolation(msg.into())
}

/// Validation utilities for input sanitization and edge case handling
#[derive(Debug, Copy, Clone)]
pub struct InputValidator;

impl InputValidator {
    /// Validate a message sender identifier
    ///
    /// Senders are kept verbatim: short codes and alphanumeric sender ids
    /// are as legitimate as full phone numbers.
    pub fn validate_sender(sender: &str) -> Result<()> {
        if sender.trim().is_empty() {
            return Err(violation("Sender cannot be empty"));
        }

        if sender.chars().count() > MAX_SENDER_LEN {
            return Err(violation(format!(
                "Sender too long (max {MAX_SENDER_LEN} characters)"
            )));
        }

        if sender.chars().any(char::is_control) {
            return Err(violation("Sender contains invalid characters"));
        }

        Ok(())
    }

    /// Validate an allow-list phone number
    pub fn validate_phone(phone: &str) -> Result<()> {
        Self::validate_sender(phone)
            .map_err(|_| violation(format!("Invalid allow-list phone number: {phone:?}")))
    }

    /// Validate an allow-list display name
    pub fn validate_display_name(name: &str) -> Result<()> {
        if name.chars().count() > MAX_DISPLAY_NAME_LEN {
            return Err(violation(format!(
                "Display name too long (max {MAX_DISPLAY_NAME_LEN} characters)"
            )));
        }

        // Check for potentially dangerous characters
        if name.contains('\0') || name.contains('\r') || name.contains('\n') {
            return Err(violation("Display name contains invalid characters"));
        }

        Ok(())
    }

    /// Validate a classifier score
    pub fn validate_confidence(confidence: f64) -> Result<()> {
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(violation(format!(
                "Confidence must be within [0, 1], got {confidence}"
            )));
        }
        Ok(())
    }

    /// Validate a result limit for list queries
    pub fn validate_limit(limit: usize) -> Result<()> {
        if limit == 0 {
            return Err(violation("Limit must be greater than 0"));
        }

        if i64::try_from(limit).is_err() {
            return Err(violation("Limit too large"));
        }

        Ok(())
    }

    /// Validate retention age in days
    pub fn validate_retention_days(days: u32) -> Result<()> {
        if days == 0 {
            return Err(violation("Retention must keep at least one day"));
        }

        if days > 365 * 20 {
            tracing::warn!(days, "retention longer than 20 years");
        }

        Ok(())
    }

    /// Validate an export file path
    pub fn validate_file_path(path: &Path) -> Result<()> {
        if path.to_string_lossy().is_empty() {
            return Err(violation("File path cannot be empty"));
        }

        // Check for path traversal attempts
        let path_str = path.to_string_lossy();
        if path_str.contains("..") {
            return Err(violation(
                "File path contains potentially dangerous characters",
            ));
        }

        // Check path length
        if path_str.len() > 4096 {
            return Err(violation("File path too long (max 4096 characters)"));
        }

        Ok(())
    }
}
