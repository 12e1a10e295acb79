//! Change notification and live queries
//!
//! Each table owns a `watch` channel carrying a commit counter. Writers bump
//! the counter after a successful commit; the send never waits on readers,
//! and a reader that falls behind sees only the latest counter, so it
//! re-queries once instead of once per commit. Counters only grow, which
//! keeps the order of observed changes equal to commit order.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::db::Database;
use crate::error::{Result, TriageError};

/// Tables that can be observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    /// `filtered_messages`
    FilteredMessages,
    /// `allowed_senders`
    AllowedSenders,
}

impl Table {
    /// Physical table name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::FilteredMessages => crate::schema::filtered_messages::TABLE,
            Self::AllowedSenders => crate::schema::allowed_senders::TABLE,
        }
    }
}

/// Per-table commit counters
#[derive(Debug)]
pub struct ChangeNotifier {
    messages: watch::Sender<u64>,
    allowed_senders: watch::Sender<u64>,
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeNotifier {
    /// Create counters for every table, all at zero
    #[must_use]
    pub fn new() -> Self {
        let (messages, _) = watch::channel(0);
        let (allowed_senders, _) = watch::channel(0);
        Self {
            messages,
            allowed_senders,
        }
    }

    const fn sender(&self, table: Table) -> &watch::Sender<u64> {
        match table {
            Table::FilteredMessages => &self.messages,
            Table::AllowedSenders => &self.allowed_senders,
        }
    }

    /// Signal that a transaction touching `tables` has committed
    pub fn notify(&self, tables: &[Table]) {
        for table in tables {
            self.sender(*table).send_modify(|version| *version = version.wrapping_add(1));
            trace!(table = table.name(), "change signalled");
        }
    }

    /// Current commit counter of `table`
    #[must_use]
    pub fn version(&self, table: Table) -> u64 {
        *self.sender(table).borrow()
    }

    /// Receiver that wakes on every commit to `table`
    #[must_use]
    pub fn watch(&self, table: Table) -> watch::Receiver<u64> {
        self.sender(table).subscribe()
    }
}

/// A read query that can be re-run whenever its table changes
pub trait LiveQuery: Send + Sync + 'static {
    /// Result delivered to subscribers
    type Output: Send + 'static;

    /// Table whose commits invalidate the result
    fn table(&self) -> Table;

    /// Execute the query against a consistent snapshot
    fn run(&self, db: &Database) -> Result<Self::Output>;
}

/// Cancels a [`Subscription`] from anywhere, including another task
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    cancel: Arc<watch::Sender<bool>>,
}

impl SubscriptionHandle {
    /// Stop the subscription; a query already running may still deliver once
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Whether cancellation was requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }
}

/// A live, restartable sequence of query results
///
/// The first call to [`Subscription::next`] returns the current state
/// without waiting. Every later call waits for a commit to the query's
/// table and returns a fresh result. The sequence only ends when it is
/// cancelled.
pub struct Subscription<Q: LiveQuery> {
    db: Database,
    query: Arc<Q>,
    changes: watch::Receiver<u64>,
    cancel: Arc<watch::Sender<bool>>,
    cancelled: watch::Receiver<bool>,
    primed: bool,
}

impl<Q: LiveQuery> Subscription<Q> {
    pub(crate) fn new(db: Database, query: Q) -> Self {
        let changes = db.notifier().watch(query.table());
        let (cancel, cancelled) = watch::channel(false);
        Self {
            db,
            query: Arc::new(query),
            changes,
            cancel: Arc::new(cancel),
            cancelled,
            primed: false,
        }
    }

    /// The query this subscription re-runs
    #[must_use]
    pub fn query(&self) -> &Q {
        &self.query
    }

    /// Handle that can cancel this subscription
    #[must_use]
    pub fn handle(&self) -> SubscriptionHandle {
        SubscriptionHandle {
            cancel: Arc::clone(&self.cancel),
        }
    }

    /// Deliver the current state again on the next call, without waiting
    pub fn restart(&mut self) {
        self.primed = false;
    }

    /// Next result, or `None` once cancelled
    pub async fn next(&mut self) -> Option<Result<Q::Output>> {
        if *self.cancelled.borrow() {
            return None;
        }

        if self.primed {
            tokio::select! {
                changed = self.changes.changed() => {
                    if changed.is_err() {
                        debug!(table = self.query.table().name(), "notifier dropped, ending subscription");
                        return None;
                    }
                }
                _ = self.cancelled.changed() => {}
            }
            if *self.cancelled.borrow() {
                return None;
            }
        }

        // Mark the current version seen before querying so a commit that
        // lands while the query runs triggers another round.
        self.changes.borrow_and_update();
        self.primed = true;

        let db = self.db.clone();
        let query = Arc::clone(&self.query);
        let result = tokio::task::spawn_blocking(move || query.run(&db))
            .await
            .map_err(TriageError::from)
            .and_then(|r| r);
        Some(result)
    }

    /// Forward results into a bounded channel from a spawned task
    ///
    /// The task stops when the receiver is dropped or the subscription is
    /// cancelled through a handle taken beforehand.
    pub fn into_channel(mut self, buffer: usize) -> (mpsc::Receiver<Result<Q::Output>>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let task = tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    next = self.next() => next,
                    () = tx.closed() => None,
                };
                let Some(item) = next else { break };
                if tx.send(item).await.is_err() {
                    break;
                }
            }
            debug!(table = self.query.table().name(), "subscription task finished");
        });
        (rx, task)
    }
}

impl<Q: LiveQuery> std::fmt::Debug for Subscription<Q> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("table", &self.query.table())
            .field("primed", &self.primed)
            .field("cancelled", &*self.cancelled.borrow())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_bumps_only_named_tables() {
        let notifier = ChangeNotifier::new();
        notifier.notify(&[Table::FilteredMessages]);
        notifier.notify(&[Table::FilteredMessages]);
        assert_eq!(notifier.version(Table::FilteredMessages), 2);
        assert_eq!(notifier.version(Table::AllowedSenders), 0);
    }

    #[tokio::test]
    async fn receivers_observe_latest_version() {
        let notifier = ChangeNotifier::new();
        let mut rx = notifier.watch(Table::AllowedSenders);
        notifier.notify(&[Table::AllowedSenders]);
        notifier.notify(&[Table::AllowedSenders]);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 2);
    }
}
