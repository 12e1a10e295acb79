//! Metrics emitted through the `metrics` facade
//!
//! The library never installs a recorder; without one every call is a
//! no-op. Binaries and tests may install whatever exporter they like.

use metrics::{counter, histogram};

use crate::models::Verdict;

/// Verdicts persisted, labelled by category, filter type and block state
pub const VERDICTS_TOTAL: &str = "sms_triage_verdicts_total";
/// Classifier calls that returned an error
pub const CLASSIFIER_FAILURES_TOTAL: &str = "sms_triage_classifier_failures_total";
/// Evaluations that skipped the classifier because the sender is trusted
pub const ALLOW_LIST_HITS_TOTAL: &str = "sms_triage_allow_list_hits_total";
/// Rows removed by retention sweeps, labelled by sweep kind
pub const SWEPT_ROWS_TOTAL: &str = "sms_triage_swept_rows_total";
/// Size of batch inserts
pub const BATCH_SIZE: &str = "sms_triage_batch_size";
/// User overrides applied
pub const OVERRIDES_TOTAL: &str = "sms_triage_overrides_total";
/// Rows exported to CSV or JSON
pub const EXPORTED_ROWS_TOTAL: &str = "sms_triage_exported_rows_total";

/// Record one stored verdict
pub fn record_verdict(verdict: &Verdict) {
    counter!(
        VERDICTS_TOTAL,
        "category" => verdict.category.as_str(),
        "filter_type" => verdict.filter_type.as_str(),
        "blocked" => if verdict.is_blocked { "true" } else { "false" }
    )
    .increment(1);
}

/// Record a classifier error; `final_attempt` marks the one that gave up
pub fn record_classifier_failure(final_attempt: bool) {
    counter!(
        CLASSIFIER_FAILURES_TOTAL,
        "final" => if final_attempt { "true" } else { "false" }
    )
    .increment(1);
}

/// Record an allow-list short-circuit
pub fn record_allow_list_hit() {
    counter!(ALLOW_LIST_HITS_TOTAL).increment(1);
}

/// Record rows removed by a sweep of `kind`
pub fn record_sweep(kind: &'static str, removed: usize) {
    counter!(SWEPT_ROWS_TOTAL, "kind" => kind).increment(removed as u64);
}

/// Record the size of a batch insert
#[allow(clippy::cast_precision_loss)]
pub fn record_batch(size: usize) {
    histogram!(BATCH_SIZE).record(size as f64);
}

/// Record a user override
pub fn record_override(blocked: bool) {
    counter!(
        OVERRIDES_TOTAL,
        "blocked" => if blocked { "true" } else { "false" }
    )
    .increment(1);
}

/// Record exported rows
pub fn record_export(rows: usize) {
    counter!(EXPORTED_ROWS_TOTAL).increment(rows as u64);
}
