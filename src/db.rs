use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, Transaction, TransactionBehavior};
use tracing::{debug, info};

use crate::allowlist::AllowListStore;
use crate::config::DatabaseConfig;
use crate::error::{Result, TriageError};
use crate::messages::MessageStore;
use crate::notifier::{ChangeNotifier, LiveQuery, Subscription, Table};
use crate::schema::MIGRATIONS;

/// Type alias for the database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;
/// A connection checked out of the pool
pub type DbConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Shared handle to the triage store
///
/// Cloning is cheap; every clone shares the pool, the writer lock and the
/// change notifier.
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    write_lock: Arc<Mutex<()>>,
    notifier: Arc<ChangeNotifier>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("pool", &self.pool.state())
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Open (or create) the database at `path` with default pool settings
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_config(&DatabaseConfig {
            path: path.as_ref().to_string_lossy().into_owned(),
            ..DatabaseConfig::default()
        })
    }

    /// Open (or create) the database described by `config`
    pub fn with_config(config: &DatabaseConfig) -> Result<Self> {
        let path = Path::new(&config.path);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
        let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            // WAL lets readers keep a committed snapshot while a writer is active
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
            conn.pragma_update(None, "synchronous", "NORMAL")
        });
        let pool = Pool::builder()
            .max_size(config.max_connections)
            .connection_timeout(Duration::from_secs(config.connection_timeout_secs))
            .build(manager)?;

        let db = Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
            notifier: Arc::new(ChangeNotifier::new()),
        };
        db.run_migrations()?;
        info!(path = %config.path, "database ready");
        Ok(db)
    }

    /// Apply pending migrations, recording each in `schema_migrations`
    fn run_migrations(&self) -> Result<()> {
        let mut conn = self.get_connection()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                name TEXT PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            );",
        )?;

        for (name, sql) in MIGRATIONS {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|e| TriageError::transaction(&e))?;
            let applied: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM schema_migrations WHERE name = ?1)",
                params![name],
                |row| row.get(0),
            )?;
            if !applied {
                tx.execute_batch(sql)?;
                tx.execute(
                    "INSERT INTO schema_migrations (name) VALUES (?1)",
                    params![name],
                )?;
                debug!(migration = name, "applied migration");
            }
            tx.commit().map_err(|e| TriageError::transaction(&e))?;
        }
        Ok(())
    }

    /// Get a connection from the pool
    pub fn get_connection(&self) -> Result<DbConnection> {
        Ok(self.pool.get()?)
    }

    /// The change notifier shared by every clone
    #[must_use]
    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    /// Message store over this database
    #[must_use]
    pub fn messages(&self) -> MessageStore {
        MessageStore::new(self.clone())
    }

    /// Allow-list store over this database
    #[must_use]
    pub fn allow_list(&self) -> AllowListStore {
        AllowListStore::new(self.clone())
    }

    /// Register a live query; see [`Subscription`]
    #[must_use]
    pub fn subscribe<Q: LiveQuery>(&self, query: Q) -> Subscription<Q> {
        Subscription::new(self.clone(), query)
    }

    /// Run `op` inside one write transaction, then signal `tables`
    ///
    /// Writers are serialized by a process-wide lock. The transaction is
    /// rolled back when `op` fails or the commit fails, and in that case
    /// nobody is notified. Notification happens before the lock is
    /// released so subscribers observe commits in commit order.
    pub(crate) fn write<T>(
        &self,
        tables: &[Table],
        op: impl FnOnce(&Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| TriageError::TransactionFailure("writer lock poisoned".to_string()))?;
        let mut conn = self.get_connection()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| TriageError::transaction(&e))?;

        let value = op(&tx)?;

        tx.commit().map_err(|e| TriageError::transaction(&e))?;
        self.notifier.notify(tables);
        Ok(value)
    }

    /// Run a read-only closure on a pooled connection
    pub(crate) fn read<T>(&self, op: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.get_connection()?;
        op(&conn)
    }
}
