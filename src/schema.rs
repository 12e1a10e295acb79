//! Database schema definitions
//!
//! Constants for table and column names used with rusqlite, plus the
//! ordered list of migrations applied when a [`crate::Database`] opens.

/// Filtered messages table schema
pub mod filtered_messages {
    /// Table name
    pub const TABLE: &str = "filtered_messages";
    /// Primary key column
    pub const ID: &str = "id";
    /// Sender identifier (phone number or short code)
    pub const SENDER: &str = "sender";
    /// Full message text
    pub const MESSAGE_BODY: &str = "message_body";
    /// Receipt timestamp, epoch nanoseconds UTC
    pub const RECEIVED_AT: &str = "received_at";
    /// Canonical category string
    pub const CATEGORY: &str = "category";
    /// Classifier score in [0, 1]
    pub const CONFIDENCE: &str = "confidence";
    /// Canonical filter type string
    pub const FILTER_TYPE: &str = "filter_type";
    /// Effective block decision
    pub const IS_BLOCKED: &str = "is_blocked";
    /// Set once a user corrected the block decision
    pub const IS_USER_OVERRIDE: &str = "is_user_override";
    /// Read flag
    pub const IS_READ: &str = "is_read";

    /// Column list used by every SELECT, in a fixed order
    pub const COLUMNS: &str = "id, sender, message_body, received_at, category, confidence, \
                               filter_type, is_blocked, is_user_override, is_read";
}

/// Allowed senders table schema
pub mod allowed_senders {
    /// Table name
    pub const TABLE: &str = "allowed_senders";
    /// Primary key column
    pub const ID: &str = "id";
    /// Phone number column
    pub const PHONE_NUMBER: &str = "phone_number";
    /// Optional human label
    pub const DISPLAY_NAME: &str = "display_name";
    /// Creation timestamp, epoch nanoseconds UTC
    pub const ADDED_AT: &str = "added_at";
    /// Soft-delete flag
    pub const IS_ACTIVE: &str = "is_active";

    /// Column list used by every SELECT, in a fixed order
    pub const COLUMNS: &str = "id, phone_number, display_name, added_at, is_active";
}

/// Migrations in application order: `(name, sql)`
pub const MIGRATIONS: &[(&str, &str)] = &[
    (
        "2026-10-01-000000_create_tables",
        include_str!("../migrations/2026-10-01-000000_create_tables/up.sql"),
    ),
    (
        "2026-10-08-000000_allowed_senders_active_index",
        include_str!("../migrations/2026-10-08-000000_allowed_senders_active_index/up.sql"),
    ),
];
