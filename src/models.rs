//! Data models for verdicts and allow-list entries
//!
//! The enumerations are stored as text. Their canonical strings are fixed
//! here once and must stay stable across releases, since rows written by
//! older builds are read back through [`FromStr`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::{allowed_senders, filtered_messages};

/// A stored string did not match any known variant
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    /// Enumeration being parsed
    pub kind: &'static str,
    /// Offending text
    pub value: String,
}

macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// Every variant, in declaration order
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Canonical stored representation
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

text_enum! {
    /// Classification outcome for a message
    MessageCategory, "category" {
        /// Legitimate message
        Ok => "OK",
        /// Unsolicited junk
        Spam => "SPAM",
        /// Marketing and offers
        Promotional => "PROMOTIONAL",
        /// Credential or payment lures
        Phishing => "PHISHING",
        /// Reminders, deliveries, one-time codes
        Notification => "NOTIFICATION",
        /// Banking and payment activity
        Transaction => "TRANSACTION",
        /// No usable classification
        Unknown => "UNKNOWN",
    }
}

text_enum! {
    /// Reason a verdict was reached
    FilterType, "filter type" {
        /// Generic content heuristics
        ContentHeuristic => "CONTENT_HEURISTIC",
        /// Model-based classification
        MlClassification => "ML_CLASSIFICATION",
        /// Keyword list match
        KeywordFilter => "KEYWORD_FILTER",
        /// Regular expression match
        RegexFilter => "REGEX_FILTER",
        /// Sender is on the active allow-list
        Allowlist => "ALLOWLIST",
        /// Verdict set by a user correction
        UserOverride => "USER_OVERRIDE",
        /// Sender is explicitly blocked
        Blocklist => "BLOCKLIST",
        /// Classifier failed; verdict is a placeholder
        ClassifierUnavailable => "CLASSIFIER_UNAVAILABLE",
    }
}

/// How a message was judged
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// Classification outcome
    pub category: MessageCategory,
    /// Score in [0, 1]
    pub confidence: f64,
    /// Reason for the verdict
    pub filter_type: FilterType,
    /// Effective block decision
    pub is_blocked: bool,
    /// True once a user has corrected `is_blocked`
    pub is_user_override: bool,
}

impl Verdict {
    /// Verdict for a sender on the active allow-list
    #[must_use]
    pub const fn allow_listed() -> Self {
        Self {
            category: MessageCategory::Ok,
            confidence: 1.0,
            filter_type: FilterType::Allowlist,
            is_blocked: false,
            is_user_override: false,
        }
    }

    /// Auditable placeholder persisted when the classifier could not answer
    #[must_use]
    pub const fn classifier_unavailable() -> Self {
        Self {
            category: MessageCategory::Unknown,
            confidence: 0.0,
            filter_type: FilterType::ClassifierUnavailable,
            is_blocked: false,
            is_user_override: false,
        }
    }
}

/// A raw message handed to the decision engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingMessage {
    /// Sender identifier
    pub sender: String,
    /// Full message text
    pub body: String,
    /// Time of receipt
    pub received_at: DateTime<Utc>,
}

impl IncomingMessage {
    /// Build an incoming message
    pub fn new(sender: impl Into<String>, body: impl Into<String>, received_at: DateTime<Utc>) -> Self {
        Self {
            sender: sender.into(),
            body: body.into(),
            received_at,
        }
    }
}

/// One evaluated, stored message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredMessage {
    /// Surrogate key, increasing in insert order
    pub id: i64,
    /// Sender identifier
    pub sender: String,
    /// Full message text
    pub message_body: String,
    /// Time of receipt
    pub received_at: DateTime<Utc>,
    /// Classification outcome
    pub category: MessageCategory,
    /// Score in [0, 1]
    pub confidence: f64,
    /// Reason for the verdict
    pub filter_type: FilterType,
    /// Effective block decision
    pub is_blocked: bool,
    /// True once a user has corrected `is_blocked`
    pub is_user_override: bool,
    /// Read flag
    pub is_read: bool,
}

impl FilteredMessage {
    /// The verdict part of this row
    #[must_use]
    pub const fn verdict(&self) -> Verdict {
        Verdict {
            category: self.category,
            confidence: self.confidence,
            filter_type: self.filter_type,
            is_blocked: self.is_blocked,
            is_user_override: self.is_user_override,
        }
    }

    /// Map a row selected with [`filtered_messages::COLUMNS`]
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(filtered_messages::ID)?,
            sender: row.get(filtered_messages::SENDER)?,
            message_body: row.get(filtered_messages::MESSAGE_BODY)?,
            received_at: from_nanos(row.get(filtered_messages::RECEIVED_AT)?),
            category: row.get(filtered_messages::CATEGORY)?,
            confidence: row.get(filtered_messages::CONFIDENCE)?,
            filter_type: row.get(filtered_messages::FILTER_TYPE)?,
            is_blocked: row.get(filtered_messages::IS_BLOCKED)?,
            is_user_override: row.get(filtered_messages::IS_USER_OVERRIDE)?,
            is_read: row.get(filtered_messages::IS_READ)?,
        })
    }
}

/// Data for creating a new filtered message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFilteredMessage {
    /// Sender identifier
    pub sender: String,
    /// Full message text
    pub message_body: String,
    /// Time of receipt
    pub received_at: DateTime<Utc>,
    /// Verdict to persist
    pub verdict: Verdict,
    /// Read flag, false for freshly evaluated messages
    pub is_read: bool,
}

impl NewFilteredMessage {
    /// Unread row for `incoming` judged as `verdict`
    #[must_use]
    pub fn from_incoming(incoming: IncomingMessage, verdict: Verdict) -> Self {
        Self {
            sender: incoming.sender,
            message_body: incoming.body,
            received_at: incoming.received_at,
            verdict,
            is_read: false,
        }
    }

    /// The stored row this became once assigned `id`
    #[must_use]
    pub fn into_stored(self, id: i64) -> FilteredMessage {
        FilteredMessage {
            id,
            sender: self.sender,
            message_body: self.message_body,
            received_at: self.received_at,
            category: self.verdict.category,
            confidence: self.verdict.confidence,
            filter_type: self.verdict.filter_type,
            is_blocked: self.verdict.is_blocked,
            is_user_override: self.verdict.is_user_override,
            is_read: self.is_read,
        }
    }
}

/// One trusted-sender entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedSender {
    /// Surrogate key
    pub id: i64,
    /// Phone number or short code
    pub phone_number: String,
    /// Optional human label
    pub display_name: Option<String>,
    /// Creation time
    pub added_at: DateTime<Utc>,
    /// Soft-delete flag
    pub is_active: bool,
}

impl AllowedSender {
    /// Map a row selected with [`allowed_senders::COLUMNS`]
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(allowed_senders::ID)?,
            phone_number: row.get(allowed_senders::PHONE_NUMBER)?,
            display_name: row.get(allowed_senders::DISPLAY_NAME)?,
            added_at: from_nanos(row.get(allowed_senders::ADDED_AT)?),
            is_active: row.get(allowed_senders::IS_ACTIVE)?,
        })
    }
}

/// Data for creating a new allow-list entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAllowedSender {
    /// Phone number or short code
    pub phone_number: String,
    /// Optional human label
    pub display_name: Option<String>,
    /// Creation time (defaults to now)
    pub added_at: Option<DateTime<Utc>>,
}

impl NewAllowedSender {
    /// Entry for `phone_number` with no label
    pub fn new(phone_number: impl Into<String>) -> Self {
        Self {
            phone_number: phone_number.into(),
            display_name: None,
            added_at: None,
        }
    }

    /// Attach a display name
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Pin the creation time
    #[must_use]
    pub fn added_at(mut self, at: DateTime<Utc>) -> Self {
        self.added_at = Some(at);
        self
    }
}

/// Aggregate counts for dashboards
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageStats {
    /// Rows considered
    pub total: usize,
    /// Rows currently blocked
    pub blocked: usize,
    /// Rows not yet read
    pub unread: usize,
    /// Rows per category; categories with no rows are omitted
    pub by_category: std::collections::BTreeMap<MessageCategory, usize>,
}

/// Convert a timestamp to the stored epoch-nanosecond form
///
/// Only 1677-09-21 through 2262-04-11 fits in an `i64`; anything outside
/// is a `ConstraintViolation`.
pub fn to_nanos(at: DateTime<Utc>) -> crate::error::Result<i64> {
    at.timestamp_nanos_opt().ok_or_else(|| {
        crate::error::TriageError::ConstraintViolation(format!("timestamp out of range: {at}"))
    })
}

/// Query bound for `at`, saturating outside the storable range
pub(crate) fn bound_nanos(at: DateTime<Utc>) -> i64 {
    at.timestamp_nanos_opt()
        .unwrap_or(if at.timestamp() < 0 { i64::MIN } else { i64::MAX })
}

/// Convert a stored epoch-nanosecond value back to a timestamp
pub(crate) fn from_nanos(nanos: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_nanos(nanos)
}
