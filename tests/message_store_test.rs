//! Integration tests for the message store

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use tempfile::{tempdir, TempDir};

use sms_triage::config::RetentionConfig;
use sms_triage::{
    Database, FilterType, FilteredMessage, MessageCategory, MessageQuery, NewFilteredMessage, OverrideController,
    TriageError, Verdict,
};

fn open_db() -> (TempDir, Database) {
    let temp_dir = tempdir().expect("Failed to create temp directory");
    let db = Database::new(temp_dir.path().join("test.db")).expect("Failed to create database");
    (temp_dir, db)
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 20, 12, 0, 0).unwrap()
}

fn message(sender: &str, minutes: i64, category: MessageCategory, blocked: bool) -> NewFilteredMessage {
    NewFilteredMessage {
        sender: sender.to_string(),
        message_body: format!("body from {sender} at +{minutes}m"),
        received_at: base_time() + Duration::minutes(minutes),
        verdict: Verdict {
            category,
            confidence: 0.8,
            filter_type: FilterType::KeywordFilter,
            is_blocked: blocked,
            is_user_override: false,
        },
        is_read: false,
    }
}

fn ids(rows: &[FilteredMessage]) -> Vec<i64> {
    rows.iter().map(|m| m.id).collect()
}

#[test]
fn test_insert_one_and_get() {
    let (_dir, db) = open_db();
    let store = db.messages();

    let new = message("555-0001", 0, MessageCategory::Spam, true);
    let id = store.insert_one(&new).expect("Failed to insert message");
    let stored = store.get(id).expect("Failed to get message").expect("Message missing");

    assert_eq!(stored, new.clone().into_stored(id));
    assert!(!stored.is_read);
    assert!(store.get(id + 100).expect("get").is_none());
}

#[test]
fn test_ids_increase_in_insert_order() {
    let (_dir, db) = open_db();
    let store = db.messages();
    let a = store.insert_one(&message("a", 5, MessageCategory::Ok, false)).expect("insert");
    let b = store.insert_one(&message("b", 1, MessageCategory::Ok, false)).expect("insert");
    store.delete(&store.get(b).expect("get").expect("row")).expect("delete");
    let c = store.insert_one(&message("c", 1, MessageCategory::Ok, false)).expect("insert");
    assert!(a < b && b < c);
}

#[test]
fn test_lists_are_newest_first_and_limits_are_prefixes() {
    let (_dir, db) = open_db();
    let store = db.messages();
    for minutes in [3, 1, 4, 1, 5, 9, 2, 6] {
        store
            .insert_one(&message("s", minutes, MessageCategory::Promotional, minutes % 2 == 1))
            .expect("insert");
    }

    let all = store.list_all().expect("list_all");
    assert_eq!(all.len(), 8);
    assert!(all.windows(2).all(|w| (w[0].received_at, w[0].id) > (w[1].received_at, w[1].id)));

    let limited = store.list_all_limited(3).expect("list_all_limited");
    assert_eq!(ids(&limited), ids(&all[..3]));

    let blocked = store.list_blocked(None).expect("list_blocked");
    assert!(blocked.iter().all(|m| m.is_blocked));
    assert_eq!(ids(&store.list_blocked(Some(2)).expect("limited")), ids(&blocked[..2]));

    let by_category = store
        .list_by_category(MessageCategory::Promotional, Some(4))
        .expect("list_by_category");
    assert_eq!(ids(&by_category), ids(&all[..4]));
}

#[test]
fn test_zero_limit_is_rejected() {
    let (_dir, db) = open_db();
    assert!(matches!(
        db.messages().list_all_limited(0),
        Err(TriageError::ConstraintViolation(_))
    ));
}

#[test]
fn test_list_since_is_inclusive() {
    let (_dir, db) = open_db();
    let store = db.messages();
    for minutes in 0..5 {
        store.insert_one(&message("s", minutes, MessageCategory::Ok, false)).expect("insert");
    }
    let since = store.list_since(base_time() + Duration::minutes(2)).expect("list_since");
    assert_eq!(since.len(), 3);
    assert_eq!(since.last().expect("row").received_at, base_time() + Duration::minutes(2));
}

#[test]
fn test_insert_batch_is_all_or_nothing() {
    let (_dir, db) = open_db();
    let store = db.messages();

    let good: Vec<_> = (0..4).map(|i| message("ok", i, MessageCategory::Ok, false)).collect();
    let stored = store.insert_batch(&good).expect("Failed to insert batch");
    assert_eq!(stored.len(), 4);
    assert_eq!(store.list_all().expect("list_all").len(), 4);

    let mut bad: Vec<_> = (10..15).map(|i| message("bad", i, MessageCategory::Spam, true)).collect();
    bad[3].verdict.confidence = 1.5;
    assert!(matches!(store.insert_batch(&bad), Err(TriageError::ConstraintViolation(_))));

    let mut empty_sender: Vec<_> = (20..23).map(|i| message("x", i, MessageCategory::Spam, true)).collect();
    empty_sender[2].sender = String::new();
    assert!(store.insert_batch(&empty_sender).is_err());

    assert_eq!(store.list_all().expect("list_all").len(), 4);
    assert!(store.insert_batch(&[]).expect("empty batch").is_empty());
}

#[test]
fn test_delete_by_category_and_counts() {
    let (_dir, db) = open_db();
    let store = db.messages();
    for i in 0..3 {
        store.insert_one(&message("s", i, MessageCategory::Spam, true)).expect("insert");
    }
    for i in 3..5 {
        store.insert_one(&message("s", i, MessageCategory::Transaction, false)).expect("insert");
    }

    assert_eq!(store.count_by_category(MessageCategory::Spam, None).expect("count"), 3);
    assert_eq!(
        store
            .count_by_category(MessageCategory::Spam, Some(base_time() + Duration::minutes(1)))
            .expect("count since"),
        2
    );
    assert_eq!(store.delete_by_category(MessageCategory::Spam).expect("delete"), 3);
    assert_eq!(store.delete_by_category(MessageCategory::Spam).expect("delete again"), 0);
    assert_eq!(store.count_by_category(MessageCategory::Transaction, None).expect("count"), 2);
}

#[test]
fn test_update_keeps_user_override() {
    let (_dir, db) = open_db();
    let store = db.messages();
    let id = store.insert_one(&message("s", 0, MessageCategory::Spam, true)).expect("insert");

    let mut row = store.get(id).expect("get").expect("row");
    row.is_read = true;
    store.update(&row).expect("update");
    assert!(store.get(id).expect("get").expect("row").is_read);

    OverrideController::new(db.clone(), RetentionConfig::default())
        .apply_user_override(id, false)
        .expect("override");

    // A stale copy written back must not undo the user decision
    row.is_blocked = true;
    row.category = MessageCategory::Phishing;
    store.update(&row).expect("update");

    let stored = store.get(id).expect("get").expect("row");
    assert!(stored.is_user_override);
    assert!(!stored.is_blocked);
    assert_eq!(stored.category, MessageCategory::Phishing);
}

#[test]
fn test_new_rows_cannot_carry_override() {
    let (_dir, db) = open_db();
    let mut new = message("s", 0, MessageCategory::Ok, false);
    new.verdict.is_user_override = true;
    assert!(matches!(
        db.messages().insert_one(&new),
        Err(TriageError::ConstraintViolation(_))
    ));
}

#[test]
fn test_update_missing_row_is_not_found() {
    let (_dir, db) = open_db();
    let store = db.messages();
    let id = store.insert_one(&message("s", 0, MessageCategory::Ok, false)).expect("insert");
    let row = store.get(id).expect("get").expect("row");
    assert!(store.delete(&row).expect("delete"));
    assert!(matches!(store.update(&row), Err(TriageError::NotFound { .. })));
}

#[test]
fn test_stats() {
    let (_dir, db) = open_db();
    let store = db.messages();
    store.insert_one(&message("a", 0, MessageCategory::Spam, true)).expect("insert");
    store.insert_one(&message("b", 1, MessageCategory::Spam, true)).expect("insert");
    let mut read = message("c", 2, MessageCategory::Ok, false);
    read.is_read = true;
    store.insert_one(&read).expect("insert");

    let stats = store.stats(None).expect("stats");
    assert_eq!(stats.total, 3);
    assert_eq!(stats.blocked, 2);
    assert_eq!(stats.unread, 2);
    assert_eq!(stats.by_category.get(&MessageCategory::Spam), Some(&2));
    assert_eq!(stats.by_category.get(&MessageCategory::Ok), Some(&1));
    assert!(!stats.by_category.contains_key(&MessageCategory::Phishing));

    let recent = store.stats(Some(base_time() + Duration::minutes(1))).expect("stats since");
    assert_eq!(recent.total, 2);

    let (_other_dir, other) = open_db();
    let empty = other.messages().stats(None).expect("empty stats");
    assert_eq!(empty.total, 0);
    assert_eq!(empty.blocked, 0);
}

#[test]
fn test_query_enum_matches_list_helpers() {
    let (_dir, db) = open_db();
    let store = db.messages();
    for i in 0..4 {
        store.insert_one(&message("s", i, MessageCategory::Spam, i % 2 == 0)).expect("insert");
    }
    assert_eq!(
        ids(&store.list(&MessageQuery::Blocked { limit: Some(1) }).expect("query")),
        ids(&store.list_blocked(Some(1)).expect("helper"))
    );
}

#[test]
fn test_sub_millisecond_times_survive_storage() {
    let (_dir, db) = open_db();
    let store = db.messages();
    let mut early = message("early", 0, MessageCategory::Ok, false);
    early.received_at = base_time() + Duration::microseconds(200);
    let mut exact = message("exact", 0, MessageCategory::Ok, false);
    exact.received_at = base_time() + Duration::microseconds(700);
    let early_id = store.insert_one(&early).expect("Failed to insert");
    let exact_id = store.insert_one(&exact).expect("Failed to insert");

    let stored = store.get(early_id).expect("get").expect("row exists");
    assert_eq!(stored.received_at, early.received_at);

    let since = store.list_since(exact.received_at).expect("list_since");
    assert_eq!(ids(&since), vec![exact_id]);

    // Both rows share a millisecond; only the earlier one is older
    let removed = store.delete_older_than(exact.received_at).expect("sweep");
    assert_eq!(removed, 1);
    assert!(store.get(early_id).expect("get").is_none());
    assert!(store.get(exact_id).expect("get").is_some());
}

#[test]
fn test_unstorable_times_are_rejected() {
    let (_dir, db) = open_db();
    let store = db.messages();
    let mut far = message("far", 0, MessageCategory::Ok, false);
    far.received_at = Utc.with_ymd_and_hms(2300, 1, 1, 0, 0, 0).unwrap();
    assert!(matches!(store.insert_one(&far), Err(TriageError::ConstraintViolation(_))));

    let id = store.insert_one(&message("near", 0, MessageCategory::Ok, false)).expect("insert");
    let mut row = store.get(id).expect("get").expect("row exists");
    row.received_at = far.received_at;
    assert!(matches!(store.update(&row), Err(TriageError::ConstraintViolation(_))));

    // Out-of-range bounds still compare against every stored row
    assert_eq!(store.list_since(Utc.with_ymd_and_hms(1600, 1, 1, 0, 0, 0).unwrap()).expect("list").len(), 1);
    assert_eq!(store.delete_older_than(far.received_at).expect("sweep"), 1);
}

#[test]
fn test_stats_leaves_connection_ready_for_writes() {
    let (_dir, db) = open_db();
    let store = db.messages();
    store.insert_one(&message("a", 0, MessageCategory::Spam, true)).expect("insert");
    for round in 1..4 {
        assert_eq!(store.stats(None).expect("stats").total, round);
        store.insert_one(&message("b", round as i64, MessageCategory::Ok, false)).expect("insert after stats");
    }
    assert_eq!(store.stats(None).expect("stats").total, 4);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_delete_older_than_removes_exactly_older_rows(
        offsets in proptest::collection::vec(-50_i64..50, 1..20),
        cutoff_offset in -50_i64..50,
    ) {
        let (_dir, db) = open_db();
        let store = db.messages();
        let rows: Vec<_> = offsets
            .iter()
            .map(|m| message("p", *m, MessageCategory::Ok, false))
            .collect();
        store.insert_batch(&rows).expect("insert batch");

        let cutoff = base_time() + Duration::minutes(cutoff_offset);
        let expected = offsets.iter().filter(|m| **m < cutoff_offset).count();
        let removed = store.delete_older_than(cutoff).expect("sweep");
        prop_assert_eq!(removed, expected);

        let remaining = store.list_all().expect("list_all");
        prop_assert_eq!(remaining.len(), offsets.len() - expected);
        prop_assert!(remaining.iter().all(|m| m.received_at >= cutoff));
    }
}
