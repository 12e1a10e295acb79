//! Trusted-sender storage
//!
//! Only rows with `is_active = 1` take part in trust decisions. Inactive
//! rows stay behind as history until they are removed outright.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use tracing::{debug, info};

use crate::db::Database;
use crate::error::{Result, TriageError};
use crate::models::{to_nanos, AllowedSender, NewAllowedSender};
use crate::notifier::{LiveQuery, Subscription, Table};
use crate::schema::allowed_senders::{
    ADDED_AT, COLUMNS, DISPLAY_NAME, ID, IS_ACTIVE, PHONE_NUMBER, TABLE,
};
use crate::validation::InputValidator;

const TABLES: &[Table] = &[Table::AllowedSenders];

/// Live query over active allow-list entries, newest first
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActiveAllowedSenders;

impl LiveQuery for ActiveAllowedSenders {
    type Output = Vec<AllowedSender>;

    fn table(&self) -> Table {
        Table::AllowedSenders
    }

    fn run(&self, db: &Database) -> Result<Self::Output> {
        AllowListStore::new(db.clone()).list_active()
    }
}

/// Store for [`AllowedSender`] rows
#[derive(Debug, Clone)]
pub struct AllowListStore {
    db: Database,
}

impl AllowListStore {
    /// Store over `db`
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    /// Add a trusted sender and return the new id
    ///
    /// An already active entry for the same phone number is deactivated in
    /// the same transaction, so at most one active row exists per number.
    pub fn insert(&self, entry: &NewAllowedSender) -> Result<i64> {
        InputValidator::validate_phone(&entry.phone_number)?;
        if let Some(name) = &entry.display_name {
            InputValidator::validate_display_name(name)?;
        }
        let added_at = to_nanos(entry.added_at.unwrap_or_else(Utc::now))?;

        let id = self.db.write(TABLES, |tx| {
            let replaced = tx.execute(
                &format!("UPDATE {TABLE} SET {IS_ACTIVE} = 0 WHERE {PHONE_NUMBER} = ?1 AND {IS_ACTIVE} = 1"),
                params![entry.phone_number],
            )?;
            if replaced > 0 {
                debug!(phone = %entry.phone_number, "superseded active allow-list entry");
            }
            tx.execute(
                &format!(
                    "INSERT INTO {TABLE} ({PHONE_NUMBER}, {DISPLAY_NAME}, {ADDED_AT}, {IS_ACTIVE}) \
                     VALUES (?1, ?2, ?3, 1)"
                ),
                params![entry.phone_number, entry.display_name, added_at],
            )?;
            Ok(tx.last_insert_rowid())
        })?;

        info!(id, phone = %entry.phone_number, "sender allow-listed");
        Ok(id)
    }

    /// Overwrite an existing row by id
    pub fn update(&self, entry: &AllowedSender) -> Result<()> {
        InputValidator::validate_phone(&entry.phone_number)?;
        if let Some(name) = &entry.display_name {
            InputValidator::validate_display_name(name)?;
        }
        let added_at = to_nanos(entry.added_at)?;
        let changed = self.db.write(TABLES, |tx| {
            Ok(tx.execute(
                &format!(
                    "UPDATE {TABLE} SET {PHONE_NUMBER} = ?1, {DISPLAY_NAME} = ?2, {ADDED_AT} = ?3, \
                     {IS_ACTIVE} = ?4 WHERE {ID} = ?5"
                ),
                params![
                    entry.phone_number,
                    entry.display_name,
                    added_at,
                    entry.is_active,
                    entry.id
                ],
            )?)
        })?;
        if changed == 0 {
            return Err(TriageError::sender_not_found(entry.id));
        }
        Ok(())
    }

    /// Delete one row by id; returns whether a row was removed
    pub fn delete(&self, entry: &AllowedSender) -> Result<bool> {
        let removed = self.db.write(TABLES, |tx| {
            Ok(tx.execute(
                &format!("DELETE FROM {TABLE} WHERE {ID} = ?1"),
                params![entry.id],
            )?)
        })?;
        Ok(removed > 0)
    }

    /// Soft-delete the active entry for `phone_number`
    ///
    /// Returns the number of rows changed; zero for an unknown number.
    pub fn deactivate(&self, phone_number: &str) -> Result<usize> {
        let changed = self.db.write(TABLES, |tx| {
            Ok(tx.execute(
                &format!("UPDATE {TABLE} SET {IS_ACTIVE} = 0 WHERE {PHONE_NUMBER} = ?1 AND {IS_ACTIVE} = 1"),
                params![phone_number],
            )?)
        })?;
        debug!(phone = phone_number, changed, "deactivate");
        Ok(changed)
    }

    /// Re-activate the most recent entry for `phone_number`
    ///
    /// Older history rows for the number stay inactive. Returns the number
    /// of rows whose state changed; zero for an unknown number.
    pub fn activate(&self, phone_number: &str) -> Result<usize> {
        let changed = self.db.write(TABLES, |tx| {
            let latest: Option<(i64, bool)> = tx
                .query_row(
                    &format!(
                        "SELECT {ID}, {IS_ACTIVE} FROM {TABLE} WHERE {PHONE_NUMBER} = ?1 \
                         ORDER BY {ADDED_AT} DESC, {ID} DESC LIMIT 1"
                    ),
                    params![phone_number],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let Some((latest_id, already_active)) = latest else {
                return Ok(0);
            };

            let demoted = tx.execute(
                &format!(
                    "UPDATE {TABLE} SET {IS_ACTIVE} = 0 \
                     WHERE {PHONE_NUMBER} = ?1 AND {IS_ACTIVE} = 1 AND {ID} <> ?2"
                ),
                params![phone_number, latest_id],
            )?;
            if already_active {
                return Ok(demoted);
            }
            let promoted = tx.execute(
                &format!("UPDATE {TABLE} SET {IS_ACTIVE} = 1 WHERE {ID} = ?1"),
                params![latest_id],
            )?;
            Ok(demoted + promoted)
        })?;
        debug!(phone = phone_number, changed, "activate");
        Ok(changed)
    }

    /// Hard-delete every row, active or not, for `phone_number`
    pub fn remove(&self, phone_number: &str) -> Result<usize> {
        let removed = self.db.write(TABLES, |tx| {
            Ok(tx.execute(
                &format!("DELETE FROM {TABLE} WHERE {PHONE_NUMBER} = ?1"),
                params![phone_number],
            )?)
        })?;
        info!(phone = phone_number, removed, "allow-list entries removed");
        Ok(removed)
    }

    /// Delete the whole table, history included
    pub fn clear(&self) -> Result<usize> {
        self.db
            .write(TABLES, |tx| Ok(tx.execute(&format!("DELETE FROM {TABLE}"), [])?))
    }

    /// Active entries, newest first
    pub fn list_active(&self) -> Result<Vec<AllowedSender>> {
        self.db.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM {TABLE} WHERE {IS_ACTIVE} = 1 \
                 ORDER BY {ADDED_AT} DESC, {ID} DESC"
            ))?;
            let rows = stmt.query_map([], AllowedSender::from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    /// Every entry including deactivated history, newest first
    pub fn list_all(&self) -> Result<Vec<AllowedSender>> {
        self.db.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM {TABLE} ORDER BY {ADDED_AT} DESC, {ID} DESC"
            ))?;
            let rows = stmt.query_map([], AllowedSender::from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    /// The active entry for `phone_number`, if any
    pub fn get(&self, phone_number: &str) -> Result<Option<AllowedSender>> {
        self.db.read(|conn| {
            Ok(conn
                .query_row(
                    &format!(
                        "SELECT {COLUMNS} FROM {TABLE} WHERE {PHONE_NUMBER} = ?1 AND {IS_ACTIVE} = 1"
                    ),
                    params![phone_number],
                    AllowedSender::from_row,
                )
                .optional()?)
        })
    }

    /// Whether `phone_number` has an active entry
    ///
    /// Always reads the store; there is no cache to go stale.
    pub fn is_allowed(&self, phone_number: &str) -> Result<bool> {
        self.db.read(|conn| {
            Ok(conn.query_row(
                &format!(
                    "SELECT EXISTS(SELECT 1 FROM {TABLE} WHERE {PHONE_NUMBER} = ?1 AND {IS_ACTIVE} = 1)"
                ),
                params![phone_number],
                |row| row.get(0),
            )?)
        })
    }

    /// Live view of [`Self::list_active`]
    #[must_use]
    pub fn watch_active(&self) -> Subscription<ActiveAllowedSenders> {
        self.db.subscribe(ActiveAllowedSenders)
    }
}
