//! Unit tests for metrics.rs module

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use metrics::{Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};

use sms_triage::metrics::{
    record_allow_list_hit, record_classifier_failure, record_export, record_override, record_sweep,
    record_verdict, ALLOW_LIST_HITS_TOTAL, CLASSIFIER_FAILURES_TOTAL, EXPORTED_ROWS_TOTAL, OVERRIDES_TOTAL,
    SWEPT_ROWS_TOTAL, VERDICTS_TOTAL,
};
use sms_triage::Verdict;

/// Keeps counters keyed by `name{label=value,...}`
#[derive(Default)]
struct CountingRecorder {
    counters: Mutex<BTreeMap<String, Arc<AtomicU64>>>,
}

impl CountingRecorder {
    fn value(&self, key: &str) -> u64 {
        self.counters
            .lock()
            .expect("Failed to lock counters")
            .get(key)
            .map_or(0, |c| c.load(Ordering::SeqCst))
    }
}

fn render(key: &Key) -> String {
    let labels: Vec<String> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
    if labels.is_empty() {
        key.name().to_string()
    } else {
        format!("{}{{{}}}", key.name(), labels.join(","))
    }
}

impl Recorder for CountingRecorder {
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        let counter = Arc::clone(
            self.counters
                .lock()
                .expect("Failed to lock counters")
                .entry(render(key))
                .or_default(),
        );
        Counter::from_arc(counter)
    }

    fn register_gauge(&self, _key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        Gauge::noop()
    }

    fn register_histogram(&self, _key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        Histogram::noop()
    }
}

#[test]
fn test_verdict_counter_labels() {
    let recorder = CountingRecorder::default();
    metrics::with_local_recorder(&recorder, || {
        record_verdict(&Verdict::allow_listed());
        record_verdict(&Verdict::allow_listed());
        record_verdict(&Verdict::classifier_unavailable());
    });

    assert_eq!(
        recorder.value(&format!("{VERDICTS_TOTAL}{{category=OK,filter_type=ALLOWLIST,blocked=false}}")),
        2
    );
    assert_eq!(
        recorder.value(&format!(
            "{VERDICTS_TOTAL}{{category=UNKNOWN,filter_type=CLASSIFIER_UNAVAILABLE,blocked=false}}"
        )),
        1
    );
}

#[test]
fn test_sweep_counts_rows() {
    let recorder = CountingRecorder::default();
    metrics::with_local_recorder(&recorder, || {
        record_sweep("age", 3);
        record_sweep("age", 0);
        record_sweep("category", 5);
    });

    assert_eq!(recorder.value(&format!("{SWEPT_ROWS_TOTAL}{{kind=age}}")), 3);
    assert_eq!(recorder.value(&format!("{SWEPT_ROWS_TOTAL}{{kind=category}}")), 5);
}

#[test]
fn test_failure_override_and_export_counters() {
    let recorder = CountingRecorder::default();
    metrics::with_local_recorder(&recorder, || {
        record_classifier_failure(false);
        record_classifier_failure(true);
        record_allow_list_hit();
        record_override(true);
        record_export(12);
    });

    assert_eq!(recorder.value(&format!("{CLASSIFIER_FAILURES_TOTAL}{{final=false}}")), 1);
    assert_eq!(recorder.value(&format!("{CLASSIFIER_FAILURES_TOTAL}{{final=true}}")), 1);
    assert_eq!(recorder.value(ALLOW_LIST_HITS_TOTAL), 1);
    assert_eq!(recorder.value(&format!("{OVERRIDES_TOTAL}{{blocked=true}}")), 1);
    assert_eq!(recorder.value(EXPORTED_ROWS_TOTAL), 12);
}

#[test]
fn test_calls_without_recorder_are_noops() {
    record_verdict(&Verdict::allow_listed());
    record_sweep("age", 1);
    record_export(0);
}
