//! Verdict storage
//!
//! Every list is ordered by `received_at` descending with `id` descending as
//! the tie-break, so a limited list is always a prefix of the full one.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction};
use tracing::{debug, info};

use crate::db::Database;
use crate::error::{Result, TriageError};
use crate::logging::OperationTimer;
use crate::metrics;
use crate::models::{bound_nanos, to_nanos, FilteredMessage, MessageCategory, MessageStats, NewFilteredMessage};
use crate::notifier::{LiveQuery, Subscription, Table};
use crate::schema::filtered_messages::{
    CATEGORY, COLUMNS, CONFIDENCE, FILTER_TYPE, ID, IS_BLOCKED, IS_READ, IS_USER_OVERRIDE,
    MESSAGE_BODY, RECEIVED_AT, SENDER, TABLE,
};
use crate::validation::InputValidator;

pub(crate) const TABLES: &[Table] = &[Table::FilteredMessages];

const ORDER: &str = "ORDER BY received_at DESC, id DESC";

/// A read over `filtered_messages`, usable directly or as a live query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageQuery {
    /// Every message
    All {
        /// Optional cap on the number of rows
        limit: Option<usize>,
    },
    /// Messages of one category
    ByCategory {
        /// Category to match
        category: MessageCategory,
        /// Optional cap on the number of rows
        limit: Option<usize>,
    },
    /// Messages whose effective verdict is blocked
    Blocked {
        /// Optional cap on the number of rows
        limit: Option<usize>,
    },
    /// Messages received at or after `since`
    Since {
        /// Inclusive lower bound on `received_at`
        since: DateTime<Utc>,
    },
}

impl MessageQuery {
    fn limit(&self) -> Option<usize> {
        match self {
            Self::All { limit } | Self::ByCategory { limit, .. } | Self::Blocked { limit } => *limit,
            Self::Since { .. } => None,
        }
    }

    fn to_sql(&self) -> Result<(String, Vec<Value>)> {
        let mut args = Vec::new();
        let filter = match self {
            Self::All { .. } => String::new(),
            Self::ByCategory { category, .. } => {
                args.push(Value::Text(category.as_str().to_string()));
                format!("WHERE {CATEGORY} = ?")
            }
            Self::Blocked { .. } => format!("WHERE {IS_BLOCKED} = 1"),
            Self::Since { since } => {
                args.push(Value::Integer(bound_nanos(*since)));
                format!("WHERE {RECEIVED_AT} >= ?")
            }
        };

        let mut sql = format!("SELECT {COLUMNS} FROM {TABLE} {filter} {ORDER}");
        if let Some(limit) = self.limit() {
            InputValidator::validate_limit(limit)?;
            sql.push_str(" LIMIT ?");
            args.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
        }
        Ok((sql, args))
    }

    fn fetch(&self, conn: &Connection) -> Result<Vec<FilteredMessage>> {
        let (sql, args) = self.to_sql()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args), FilteredMessage::from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

impl LiveQuery for MessageQuery {
    type Output = Vec<FilteredMessage>;

    fn table(&self) -> Table {
        Table::FilteredMessages
    }

    fn run(&self, db: &Database) -> Result<Self::Output> {
        db.read(|conn| self.fetch(conn))
    }
}

fn insert_row(tx: &Transaction<'_>, message: &NewFilteredMessage) -> Result<i64> {
    InputValidator::validate_sender(&message.sender)?;
    InputValidator::validate_confidence(message.verdict.confidence)?;
    if message.verdict.is_user_override {
        return Err(TriageError::ConstraintViolation(
            "new rows cannot carry a user override".to_string(),
        ));
    }
    let received_at = to_nanos(message.received_at)?;
    tx.execute(
        &format!(
            "INSERT INTO {TABLE} ({SENDER}, {MESSAGE_BODY}, {RECEIVED_AT}, {CATEGORY}, {CONFIDENCE}, \
             {FILTER_TYPE}, {IS_BLOCKED}, {IS_READ}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
        ),
        params![
            message.sender,
            message.message_body,
            received_at,
            message.verdict.category,
            message.verdict.confidence,
            message.verdict.filter_type,
            message.verdict.is_blocked,
            message.is_read,
        ],
    )?;
    Ok(tx.last_insert_rowid())
}

/// Store for [`FilteredMessage`] rows
#[derive(Debug, Clone)]
pub struct MessageStore {
    db: Database,
}

impl MessageStore {
    /// Store over `db`
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert one message and return its id
    pub fn insert_one(&self, message: &NewFilteredMessage) -> Result<i64> {
        let id = self.db.write(TABLES, |tx| insert_row(tx, message))?;
        debug!(id, sender = %message.sender, "message stored");
        Ok(id)
    }

    /// Insert all messages in one transaction, or none of them
    pub fn insert_batch(&self, messages: &[NewFilteredMessage]) -> Result<Vec<i64>> {
        if messages.is_empty() {
            return Ok(Vec::new());
        }
        let timer = OperationTimer::new("insert_batch");
        let ids = self.db.write(TABLES, |tx| {
            messages.iter().map(|message| insert_row(tx, message)).collect()
        })?;
        metrics::record_batch(messages.len());
        info!(count = messages.len(), "batch stored");
        timer.finish();
        Ok(ids)
    }

    /// Fetch one message by id
    pub fn get(&self, id: i64) -> Result<Option<FilteredMessage>> {
        self.db.read(|conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {COLUMNS} FROM {TABLE} WHERE {ID} = ?1"),
                    params![id],
                    FilteredMessage::from_row,
                )
                .optional()?)
        })
    }

    /// Overwrite a stored row by id
    ///
    /// `is_user_override` is never written here; on an overridden row the
    /// block decision also stays as the user set it.
    pub fn update(&self, message: &FilteredMessage) -> Result<()> {
        InputValidator::validate_sender(&message.sender)?;
        InputValidator::validate_confidence(message.confidence)?;
        let received_at = to_nanos(message.received_at)?;
        let changed = self.db.write(TABLES, |tx| {
            Ok(tx.execute(
                &format!(
                    "UPDATE {TABLE} SET {SENDER} = ?1, {MESSAGE_BODY} = ?2, {RECEIVED_AT} = ?3, \
                     {CATEGORY} = ?4, {CONFIDENCE} = ?5, {FILTER_TYPE} = ?6, \
                     {IS_BLOCKED} = CASE WHEN {IS_USER_OVERRIDE} = 1 THEN {IS_BLOCKED} ELSE ?7 END, \
                     {IS_READ} = ?8 WHERE {ID} = ?9"
                ),
                params![
                    message.sender,
                    message.message_body,
                    received_at,
                    message.category,
                    message.confidence,
                    message.filter_type,
                    message.is_blocked,
                    message.is_read,
                    message.id,
                ],
            )?)
        })?;
        if changed == 0 {
            return Err(TriageError::message_not_found(message.id));
        }
        Ok(())
    }

    /// Delete one row by id; returns whether a row was removed
    pub fn delete(&self, message: &FilteredMessage) -> Result<bool> {
        let removed = self.db.write(TABLES, |tx| {
            Ok(tx.execute(&format!("DELETE FROM {TABLE} WHERE {ID} = ?1"), params![message.id])?)
        })?;
        Ok(removed > 0)
    }

    /// Delete rows received strictly before `cutoff`; returns the count
    pub fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let timer = OperationTimer::new("delete_older_than");
        let removed = self.db.write(TABLES, |tx| {
            Ok(tx.execute(
                &format!("DELETE FROM {TABLE} WHERE {RECEIVED_AT} < ?1"),
                params![bound_nanos(cutoff)],
            )?)
        })?;
        metrics::record_sweep("age", removed);
        info!(%cutoff, removed, "age sweep finished");
        timer.finish();
        Ok(removed)
    }

    /// Delete every row of `category`; returns the count
    pub fn delete_by_category(&self, category: MessageCategory) -> Result<usize> {
        let removed = self.db.write(TABLES, |tx| {
            Ok(tx.execute(
                &format!("DELETE FROM {TABLE} WHERE {CATEGORY} = ?1"),
                params![category],
            )?)
        })?;
        metrics::record_sweep("category", removed);
        info!(%category, removed, "category sweep finished");
        Ok(removed)
    }

    /// Delete the whole table
    pub fn clear(&self) -> Result<usize> {
        self.db
            .write(TABLES, |tx| Ok(tx.execute(&format!("DELETE FROM {TABLE}"), [])?))
    }

    /// Run an arbitrary [`MessageQuery`]
    pub fn list(&self, query: &MessageQuery) -> Result<Vec<FilteredMessage>> {
        query.run(&self.db)
    }

    /// Every message, newest first
    pub fn list_all(&self) -> Result<Vec<FilteredMessage>> {
        self.list(&MessageQuery::All { limit: None })
    }

    /// The newest `limit` messages
    pub fn list_all_limited(&self, limit: usize) -> Result<Vec<FilteredMessage>> {
        self.list(&MessageQuery::All { limit: Some(limit) })
    }

    /// Messages of `category`, newest first
    pub fn list_by_category(
        &self,
        category: MessageCategory,
        limit: Option<usize>,
    ) -> Result<Vec<FilteredMessage>> {
        self.list(&MessageQuery::ByCategory { category, limit })
    }

    /// Blocked messages, newest first
    pub fn list_blocked(&self, limit: Option<usize>) -> Result<Vec<FilteredMessage>> {
        self.list(&MessageQuery::Blocked { limit })
    }

    /// Messages received at or after `since`, newest first
    pub fn list_since(&self, since: DateTime<Utc>) -> Result<Vec<FilteredMessage>> {
        self.list(&MessageQuery::Since { since })
    }

    /// Number of messages in `category`, optionally only those at or after `since`
    pub fn count_by_category(
        &self,
        category: MessageCategory,
        since: Option<DateTime<Utc>>,
    ) -> Result<usize> {
        self.db.read(|conn| {
            let count: i64 = match since {
                Some(since) => conn.query_row(
                    &format!("SELECT COUNT(*) FROM {TABLE} WHERE {CATEGORY} = ?1 AND {RECEIVED_AT} >= ?2"),
                    params![category, bound_nanos(since)],
                    |row| row.get(0),
                )?,
                None => conn.query_row(
                    &format!("SELECT COUNT(*) FROM {TABLE} WHERE {CATEGORY} = ?1"),
                    params![category],
                    |row| row.get(0),
                )?,
            };
            Ok(usize::try_from(count).unwrap_or_default())
        })
    }

    /// Totals for dashboards, optionally restricted to `since`
    pub fn stats(&self, since: Option<DateTime<Utc>>) -> Result<MessageStats> {
        let lower = since.map_or(i64::MIN, bound_nanos);
        self.db.read(|conn| {
            // Both reads share one snapshot.
            let tx = conn.unchecked_transaction()?;
            let stats = Self::collect_stats(&tx, lower)?;
            tx.commit()?;
            Ok(stats)
        })
    }

    fn collect_stats(conn: &Connection, lower: i64) -> Result<MessageStats> {
        let (total, blocked, unread): (i64, i64, i64) = conn.query_row(
            &format!(
                "SELECT COUNT(*), COALESCE(SUM({IS_BLOCKED}), 0), COALESCE(SUM(1 - {IS_READ}), 0) \
                 FROM {TABLE} WHERE {RECEIVED_AT} >= ?1"
            ),
            params![lower],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {CATEGORY}, COUNT(*) FROM {TABLE} WHERE {RECEIVED_AT} >= ?1 GROUP BY {CATEGORY}"
        ))?;
        let rows = stmt.query_map(params![lower], |row| {
            Ok((row.get::<_, MessageCategory>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut by_category = BTreeMap::new();
        for row in rows {
            let (category, count) = row?;
            by_category.insert(category, usize::try_from(count).unwrap_or_default());
        }

        Ok(MessageStats {
            total: usize::try_from(total).unwrap_or_default(),
            blocked: usize::try_from(blocked).unwrap_or_default(),
            unread: usize::try_from(unread).unwrap_or_default(),
            by_category,
        })
    }

    /// Live view of any [`MessageQuery`]
    #[must_use]
    pub fn watch(&self, query: MessageQuery) -> Subscription<MessageQuery> {
        self.db.subscribe(query)
    }

    /// Live view of [`Self::list_blocked`]
    #[must_use]
    pub fn watch_blocked(&self, limit: Option<usize>) -> Subscription<MessageQuery> {
        self.watch(MessageQuery::Blocked { limit })
    }

    /// Live view of [`Self::list_by_category`]
    #[must_use]
    pub fn watch_category(
        &self,
        category: MessageCategory,
        limit: Option<usize>,
    ) -> Subscription<MessageQuery> {
        self.watch(MessageQuery::ByCategory { category, limit })
    }
}
