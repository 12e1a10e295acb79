//! SMS Triage - verdict storage and allow-list precedence
//!
//! A Rust library that turns incoming SMS-like messages into stored,
//! queryable and observable filtering verdicts.
//!
//! # Features
//!
//! - Allow-list of trusted senders with soft and hard deletion
//! - Decision engine with absolute allow-list precedence over classification
//! - User overrides that automatic paths never undo
//! - Transactional batch inserts and retention sweeps on SQLite
//! - Live queries re-run after every committed change
//! - CSV and JSON export

/// Trusted-sender storage
pub mod allowlist;
/// Content classifier seam and the built-in keyword classifier
pub mod classifier;
/// Configuration management
pub mod config;
/// Database operations and connection pooling
pub mod db;
/// Decision engine
pub mod engine;
/// Error types
pub mod error;
/// Export to files
pub mod export;
/// Logging setup and utilities
pub mod logging;
/// Verdict storage
pub mod messages;
/// Metrics collection
pub mod metrics;
/// Data models and structures
pub mod models;
/// Change notification and live queries
pub mod notifier;
/// User overrides and retention
pub mod overrides;
/// Database schema definitions
pub mod schema;
/// Input validation and sanitization
pub mod validation;

// Re-export key components for easier access
pub use allowlist::AllowListStore;
pub use classifier::{Classification, Classifier, ClassifierError, KeywordClassifier};
pub use config::AppConfig;
pub use db::Database;
pub use engine::DecisionEngine;
pub use error::{Result, TriageError};
pub use messages::{MessageQuery, MessageStore};
pub use models::{
    AllowedSender, FilterType, FilteredMessage, IncomingMessage, MessageCategory, NewAllowedSender,
    NewFilteredMessage, Verdict,
};
pub use notifier::{LiveQuery, Subscription, SubscriptionHandle, Table};
pub use overrides::OverrideController;
