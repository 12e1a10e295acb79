//! Integration tests for the allow-list store

use chrono::{Duration, TimeZone, Utc};
use tempfile::{tempdir, TempDir};

use sms_triage::{Database, NewAllowedSender, TriageError};

fn open_db() -> (TempDir, Database) {
    let temp_dir = tempdir().expect("Failed to create temp directory");
    let db = Database::new(temp_dir.path().join("test.db")).expect("Failed to create database");
    (temp_dir, db)
}

#[test]
fn test_insert_and_lookup() {
    let (_dir, db) = open_db();
    let store = db.allow_list();

    let id = store
        .insert(&NewAllowedSender::new("555-1000").with_display_name("Mom"))
        .expect("Failed to insert sender");
    assert!(id > 0);

    let entry = store.get("555-1000").expect("Failed to get sender").expect("Sender missing");
    assert_eq!(entry.id, id);
    assert_eq!(entry.display_name.as_deref(), Some("Mom"));
    assert!(entry.is_active);
    assert!(store.is_allowed("555-1000").expect("Failed to check sender"));
}

#[test]
fn test_unknown_sender_is_not_an_error() {
    let (_dir, db) = open_db();
    let store = db.allow_list();

    assert!(store.get("nobody").expect("Failed to get sender").is_none());
    assert!(!store.is_allowed("nobody").expect("Failed to check sender"));
    assert_eq!(store.deactivate("nobody").expect("deactivate"), 0);
    assert_eq!(store.activate("nobody").expect("activate"), 0);
    assert_eq!(store.remove("nobody").expect("remove"), 0);
}

#[test]
fn test_deactivate_then_activate() {
    let (_dir, db) = open_db();
    let store = db.allow_list();
    store.insert(&NewAllowedSender::new("555-2000")).expect("Failed to insert sender");

    assert_eq!(store.deactivate("555-2000").expect("deactivate"), 1);
    assert!(!store.is_allowed("555-2000").expect("check"));
    assert!(store.get("555-2000").expect("get").is_none());
    // Deactivated rows stay as history
    assert_eq!(store.list_all().expect("list_all").len(), 1);

    // Idempotent
    assert_eq!(store.deactivate("555-2000").expect("deactivate"), 0);

    assert_eq!(store.activate("555-2000").expect("activate"), 1);
    assert!(store.is_allowed("555-2000").expect("check"));
    assert_eq!(store.activate("555-2000").expect("activate"), 0);
}

#[test]
fn test_reinsert_supersedes_active_entry() {
    let (_dir, db) = open_db();
    let store = db.allow_list();
    let first = store.insert(&NewAllowedSender::new("555-3000")).expect("first insert");
    let second = store
        .insert(&NewAllowedSender::new("555-3000").with_display_name("Work"))
        .expect("second insert");
    assert!(second > first);

    let active = store.list_active().expect("list_active");
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, second);
    assert_eq!(store.list_all().expect("list_all").len(), 2);
}

#[test]
fn test_activate_only_restores_latest_entry() {
    let (_dir, db) = open_db();
    let store = db.allow_list();
    let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    store
        .insert(&NewAllowedSender::new("555-4000").added_at(base))
        .expect("old insert");
    let latest = store
        .insert(&NewAllowedSender::new("555-4000").added_at(base + Duration::days(1)))
        .expect("new insert");
    store.deactivate("555-4000").expect("deactivate");

    store.activate("555-4000").expect("activate");
    let active = store.list_active().expect("list_active");
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, latest);
}

#[test]
fn test_remove_deletes_history_and_reinsert_is_independent() {
    let (_dir, db) = open_db();
    let store = db.allow_list();
    store.insert(&NewAllowedSender::new("555-5000")).expect("insert");
    store.deactivate("555-5000").expect("deactivate");
    store.insert(&NewAllowedSender::new("555-5000")).expect("insert again");

    assert_eq!(store.remove("555-5000").expect("remove"), 2);
    assert!(store.get("555-5000").expect("get").is_none());
    assert!(!store.is_allowed("555-5000").expect("check"));
    assert!(store.list_all().expect("list_all").is_empty());

    store
        .insert(&NewAllowedSender::new("555-5000").with_display_name("New"))
        .expect("fresh insert");
    let entry = store.get("555-5000").expect("get").expect("entry");
    assert_eq!(entry.display_name.as_deref(), Some("New"));
}

#[test]
fn test_list_active_is_newest_first() {
    let (_dir, db) = open_db();
    let store = db.allow_list();
    let base = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
    for (i, phone) in ["a", "b", "c"].iter().enumerate() {
        store
            .insert(&NewAllowedSender::new(*phone).added_at(base + Duration::hours(i as i64)))
            .expect("insert");
    }
    let phones: Vec<_> = store
        .list_active()
        .expect("list_active")
        .into_iter()
        .map(|s| s.phone_number)
        .collect();
    assert_eq!(phones, ["c", "b", "a"]);
}

#[test]
fn test_update_and_delete_by_row() {
    let (_dir, db) = open_db();
    let store = db.allow_list();
    store.insert(&NewAllowedSender::new("555-6000")).expect("insert");
    let mut entry = store.get("555-6000").expect("get").expect("entry");

    entry.display_name = Some("Dentist".to_string());
    store.update(&entry).expect("update");
    assert_eq!(
        store.get("555-6000").expect("get").expect("entry").display_name.as_deref(),
        Some("Dentist")
    );

    assert!(store.delete(&entry).expect("delete"));
    assert!(!store.delete(&entry).expect("delete again"));
    assert!(matches!(store.update(&entry), Err(TriageError::NotFound { .. })));
}

#[test]
fn test_rejects_invalid_phone() {
    let (_dir, db) = open_db();
    let store = db.allow_list();
    assert!(matches!(
        store.insert(&NewAllowedSender::new("  ")),
        Err(TriageError::ConstraintViolation(_))
    ));
    assert!(store.insert(&NewAllowedSender::new("1".repeat(65))).is_err());
    assert!(store.list_all().expect("list_all").is_empty());
}

#[test]
fn test_clear_removes_everything() {
    let (_dir, db) = open_db();
    let store = db.allow_list();
    store.insert(&NewAllowedSender::new("x")).expect("insert");
    store.insert(&NewAllowedSender::new("y")).expect("insert");
    assert_eq!(store.clear().expect("clear"), 2);
    assert!(store.list_all().expect("list_all").is_empty());
}
