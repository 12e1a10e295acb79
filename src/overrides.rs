//! User corrections and retention
//!
//! `apply_user_override` is the only code path that sets
//! `is_user_override`, and nothing in the crate ever clears it.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Transaction};
use tracing::{debug, info};

use crate::config::RetentionConfig;
use crate::db::Database;
use crate::error::{Result, TriageError};
use crate::messages::TABLES;
use crate::metrics;
use crate::models::MessageCategory;
use crate::schema::filtered_messages::{CATEGORY, ID, IS_BLOCKED, IS_READ, IS_USER_OVERRIDE, TABLE};
use crate::validation::InputValidator;

/// `Some(is_user_override)` for an existing row, `None` otherwise
fn override_flag(tx: &Transaction<'_>, id: i64) -> Result<Option<bool>> {
    Ok(tx
        .query_row(
            &format!("SELECT {IS_USER_OVERRIDE} FROM {TABLE} WHERE {ID} = ?1"),
            params![id],
            |row| row.get(0),
        )
        .optional()?)
}

/// Applies block/read corrections and retention sweeps
#[derive(Debug, Clone)]
pub struct OverrideController {
    db: Database,
    retention: RetentionConfig,
}

impl OverrideController {
    /// Controller over `db` with the given retention window
    #[must_use]
    pub const fn new(db: Database, retention: RetentionConfig) -> Self {
        Self { db, retention }
    }

    /// Plain block-status change that leaves `is_user_override` alone
    ///
    /// Returns `false` without touching the row when a user override is
    /// present, so automatic paths cannot undo a user decision.
    pub fn set_blocked(&self, id: i64, blocked: bool) -> Result<bool> {
        let changed = self.db.write(TABLES, |tx| {
            match override_flag(tx, id)? {
                None => Err(TriageError::message_not_found(id)),
                Some(true) => Ok(false),
                Some(false) => {
                    tx.execute(
                        &format!("UPDATE {TABLE} SET {IS_BLOCKED} = ?1 WHERE {ID} = ?2"),
                        params![blocked, id],
                    )?;
                    Ok(true)
                }
            }
        })?;
        debug!(id, blocked, changed, "set_blocked");
        Ok(changed)
    }

    /// Record a user decision: set `is_blocked` and mark the row overridden
    pub fn apply_user_override(&self, id: i64, blocked: bool) -> Result<()> {
        let changed = self.db.write(TABLES, |tx| {
            Ok(tx.execute(
                &format!("UPDATE {TABLE} SET {IS_BLOCKED} = ?1, {IS_USER_OVERRIDE} = 1 WHERE {ID} = ?2"),
                params![blocked, id],
            )?)
        })?;
        if changed == 0 {
            return Err(TriageError::message_not_found(id));
        }
        metrics::record_override(blocked);
        info!(id, blocked, "user override applied");
        Ok(())
    }

    /// Mark one row read; re-marking is a no-op
    pub fn mark_as_read(&self, id: i64) -> Result<()> {
        let changed = self.db.write(TABLES, |tx| {
            Ok(tx.execute(
                &format!("UPDATE {TABLE} SET {IS_READ} = 1 WHERE {ID} = ?1"),
                params![id],
            )?)
        })?;
        if changed == 0 {
            return Err(TriageError::message_not_found(id));
        }
        Ok(())
    }

    /// Mark every row of `category` read, returning how many rows it has
    pub fn mark_category_as_read(&self, category: MessageCategory) -> Result<usize> {
        let rows = self.db.write(TABLES, |tx| {
            Ok(tx.execute(
                &format!("UPDATE {TABLE} SET {IS_READ} = 1 WHERE {CATEGORY} = ?1"),
                params![category],
            )?)
        })?;
        debug!(%category, rows, "category marked read");
        Ok(rows)
    }

    /// Delete rows received strictly before `cutoff`
    pub fn sweep_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        self.db.messages().delete_older_than(cutoff)
    }

    /// Delete every row of `category`
    pub fn sweep_category(&self, category: MessageCategory) -> Result<usize> {
        self.db.messages().delete_by_category(category)
    }

    /// Delete rows older than the configured retention window, measured from `now`
    pub fn apply_retention(&self, now: DateTime<Utc>) -> Result<usize> {
        InputValidator::validate_retention_days(self.retention.max_age_days)?;
        let cutoff = now - self.retention.max_age();
        info!(max_age_days = self.retention.max_age_days, %cutoff, "applying retention");
        self.sweep_older_than(cutoff)
    }
}
