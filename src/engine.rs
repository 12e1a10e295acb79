//! Decision engine
//!
//! Turns an incoming message into a stored verdict. An active allow-list
//! entry short-circuits classification entirely; otherwise the external
//! classifier is consulted, retried with exponential backoff, and its
//! failure handled according to [`FailurePolicy`].

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::classifier::{Classification, Classifier, ClassifierError};
use crate::config::{EngineConfig, FailurePolicy};
use crate::db::Database;
use crate::error::{Result, TriageError};
use crate::logging::OperationTimer;
use crate::metrics;
use crate::models::{FilteredMessage, IncomingMessage, NewFilteredMessage, Verdict};
use crate::validation::InputValidator;

/// Produces and persists verdicts
#[derive(Clone)]
pub struct DecisionEngine {
    db: Database,
    classifier: Arc<dyn Classifier>,
    config: EngineConfig,
}

impl std::fmt::Debug for DecisionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionEngine")
            .field("db", &self.db)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DecisionEngine {
    /// Engine writing to `db` and consulting `classifier`
    pub fn new(db: Database, classifier: Arc<dyn Classifier>, config: EngineConfig) -> Self {
        Self {
            db,
            classifier,
            config,
        }
    }

    /// Run a store operation off the async executor
    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Database) -> Result<T> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || op(db)).await?
    }

    /// Classify with bounded retries; the last error is returned once exhausted
    async fn classify_with_retry(
        &self,
        sender: &str,
        body: &str,
    ) -> std::result::Result<Classification, ClassifierError> {
        let attempts = self.config.classifier_retries.saturating_add(1);
        let mut attempt = 1;
        loop {
            match self.classifier.classify(sender, body).await {
                Ok(classification) => return Ok(classification),
                Err(err) => {
                    let final_attempt = attempt >= attempts;
                    metrics::record_classifier_failure(final_attempt);
                    if final_attempt {
                        warn!(sender, attempts, error = %err, "classifier gave up");
                        return Err(err);
                    }
                    let delay = self.config.backoff(attempt);
                    warn!(sender, attempt, delay_ms = delay.as_millis(), error = %err, "classifier failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Decide the verdict for `(sender, body)` without persisting it
    pub async fn decide(&self, sender: &str, body: &str) -> Result<Verdict> {
        let phone = sender.to_string();
        let allowed = self
            .blocking(move |db| db.allow_list().is_allowed(&phone))
            .await?;
        if allowed {
            debug!(sender, "allow-listed sender, classifier skipped");
            metrics::record_allow_list_hit();
            return Ok(Verdict::allow_listed());
        }

        match self.classify_with_retry(sender, body).await {
            Ok(classification) => {
                InputValidator::validate_confidence(classification.confidence)?;
                Ok(Verdict {
                    category: classification.category,
                    confidence: classification.confidence,
                    filter_type: classification.filter_type,
                    is_blocked: classification.is_blocked,
                    is_user_override: false,
                })
            }
            Err(ClassifierError::Unavailable(reason)) => match self.config.failure_policy {
                FailurePolicy::MarkUnknown => Ok(Verdict::classifier_unavailable()),
                FailurePolicy::Reject => Err(TriageError::ClassifierUnavailable(reason)),
            },
        }
    }

    /// Judge one message and store the verdict
    pub async fn evaluate(&self, message: IncomingMessage) -> Result<FilteredMessage> {
        InputValidator::validate_sender(&message.sender)?;
        let verdict = self.decide(&message.sender, &message.body).await?;

        let row = NewFilteredMessage::from_incoming(message, verdict);
        let id = self
            .blocking({
                let row = row.clone();
                move |db| db.messages().insert_one(&row)
            })
            .await?;

        metrics::record_verdict(&verdict);
        info!(
            id,
            sender = %row.sender,
            category = %verdict.category,
            filter_type = %verdict.filter_type,
            blocked = verdict.is_blocked,
            "message evaluated"
        );
        Ok(row.into_stored(id))
    }

    /// Judge every message, then store all verdicts in one transaction
    ///
    /// Nothing is stored if any message fails validation or, under
    /// [`FailurePolicy::Reject`], if the classifier gives up on any of them.
    pub async fn evaluate_batch(&self, messages: Vec<IncomingMessage>) -> Result<Vec<FilteredMessage>> {
        let timer = OperationTimer::new("evaluate_batch");
        let mut rows = Vec::with_capacity(messages.len());
        for message in messages {
            InputValidator::validate_sender(&message.sender)?;
            let verdict = self.decide(&message.sender, &message.body).await?;
            rows.push(NewFilteredMessage::from_incoming(message, verdict));
        }

        let ids = self
            .blocking({
                let rows = rows.clone();
                move |db| db.messages().insert_batch(&rows)
            })
            .await?;

        for row in &rows {
            metrics::record_verdict(&row.verdict);
        }
        info!(count = rows.len(), "batch evaluated");
        timer.finish();
        Ok(rows.into_iter().zip(ids).map(|(row, id)| row.into_stored(id)).collect())
    }

    /// Re-run the decision for a stored row
    ///
    /// Rows carrying a user override come back untouched.
    pub async fn reclassify(&self, id: i64) -> Result<FilteredMessage> {
        let current = self
            .blocking(move |db| db.messages().get(id))
            .await?
            .ok_or_else(|| TriageError::message_not_found(id))?;
        if current.is_user_override {
            debug!(id, "user override present, reclassification skipped");
            return Ok(current);
        }

        let verdict = self.decide(&current.sender, &current.message_body).await?;
        let updated = FilteredMessage {
            category: verdict.category,
            confidence: verdict.confidence,
            filter_type: verdict.filter_type,
            is_blocked: verdict.is_blocked,
            ..current
        };

        let stored = self
            .blocking(move |db| {
                let store = db.messages();
                store.update(&updated)?;
                store.get(id)?.ok_or_else(|| TriageError::message_not_found(id))
            })
            .await?;
        info!(id, category = %stored.category, blocked = stored.is_blocked, "message reclassified");
        Ok(stored)
    }
}
