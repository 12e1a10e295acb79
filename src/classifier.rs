//! Content classification seam
//!
//! The decision engine only depends on [`Classifier`]. [`KeywordClassifier`]
//! is a small heuristic implementation used by the command line tool.

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ClassifierConfig;
use crate::models::{FilterType, MessageCategory};

/// Output of a content classifier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Classification outcome
    pub category: MessageCategory,
    /// Score in [0, 1]
    pub confidence: f64,
    /// Reason for the verdict
    pub filter_type: FilterType,
    /// Block decision
    pub is_blocked: bool,
}

/// Failure reported by a classifier
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClassifierError {
    /// The classifier could not produce an answer at all
    #[error("classifier unavailable: {0}")]
    Unavailable(String),
}

/// External content classifier
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Judge one message body from `sender`
    async fn classify(&self, sender: &str, body: &str) -> Result<Classification, ClassifierError>;
}

const SPAM_KEYWORDS: &[&str] = &[
    "winner", "prize", "free", "bonus", "cash", "earn", "claim", "urgent", "limited time",
    "act now", "call now", "click here", "congratulations", "you have been selected", "lucky",
    "loan", "debt", "casino", "gambling", "kazandınız", "hediye", "ödül", "bedava", "çekiliş",
    "tebrikler", "bahis", "kumar",
];

const PHISHING_PATTERNS: &[&str] = &[
    r"\b(verify|confirm|update)\s+(your\s+)?(account|identity|payment|details)",
    r"\baccount\s+(has\s+been\s+)?(suspended|locked|disabled|limited)",
    r"\b(unusual|suspicious)\s+(sign[- ]?in|login|activity)",
    r"\bpackage\s+(is\s+)?(on\s+hold|could\s+not\s+be\s+delivered)",
    r"https?://\S*(bit\.ly|tinyurl|t\.co|\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})",
];

const SPAM_PATTERNS: &[&str] = &[
    r"\b(win|won|winner)\s+(\$|€|£|₺|prize|ödül)",
    r"\b(money|cash|para)\s+(earn|win|kazan)",
    r"\b(free|ücretsiz|bedava)\s+(gift|bonus|hediye)",
    r"\b(lottery|draw|çekiliş)\s+(won|winner|kazandınız)",
    r"\b(click|tıkla)\s+(here|win|kazan)",
    r"\b(urgent|acil|hemen)\s+(call|now|ara)",
    r"\b(last|final|son)\s+(day|chance|gün|şans)",
    r"\b(loan|credit|kredi)\s+(offer|approval|teklif|onay)",
];

const TRANSACTION_KEYWORDS: &[&str] = &[
    "bank", "payment", "transfer", "balance", "account", "transaction", "invoice", "atm",
    "card", "withdraw", "deposit", "banka", "ödeme", "havale", "bakiye", "hesap", "işlem",
];

const PROMOTIONAL_KEYWORDS: &[&str] = &[
    "sale", "offer", "discount", "promotion", "deal", "special", "kampanya", "indirim",
    "fırsat", "teklif",
];

const NOTIFICATION_KEYWORDS: &[&str] = &[
    "reminder", "appointment", "scheduled", "delivery", "shipped", "activation",
    "verification", "code", "otp", "hatırlatma", "randevu", "teslimat", "kargo", "doğrulama",
];

fn compile(patterns: impl IntoIterator<Item = impl AsRef<str>>) -> Result<Vec<Regex>, regex::Error> {
    patterns
        .into_iter()
        .map(|p| RegexBuilder::new(p.as_ref()).case_insensitive(true).build())
        .collect()
}

fn keyword_hits(text: &str, keywords: &[&str]) -> usize {
    keywords.iter().filter(|k| text.contains(*k)).count()
}

/// Keyword and regular-expression heuristics
///
/// User keywords and patterns win over the built-in lists. A message is
/// blocked only when it lands in a junk category with a confidence at or
/// above the configured threshold.
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    block_threshold: f64,
    custom_keywords: Vec<String>,
    custom_patterns: Vec<Regex>,
    phishing_patterns: Vec<Regex>,
    spam_patterns: Vec<Regex>,
}

impl KeywordClassifier {
    /// Build from configuration, compiling every pattern up front
    pub fn new(config: &ClassifierConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            block_threshold: config.block_threshold,
            custom_keywords: config.custom_keywords.iter().map(|k| k.to_lowercase()).collect(),
            custom_patterns: compile(&config.custom_patterns)?,
            phishing_patterns: compile(PHISHING_PATTERNS)?,
            spam_patterns: compile(SPAM_PATTERNS)?,
        })
    }

    fn verdict(&self, category: MessageCategory, confidence: f64, filter_type: FilterType) -> Classification {
        let junk = matches!(category, MessageCategory::Spam | MessageCategory::Phishing);
        Classification {
            category,
            confidence,
            filter_type,
            is_blocked: junk && confidence >= self.block_threshold,
        }
    }

    /// Synchronous core of [`Classifier::classify`]
    #[must_use]
    pub fn evaluate(&self, sender: &str, body: &str) -> Classification {
        let text = body.to_lowercase();

        if self.custom_keywords.iter().any(|k| text.contains(k.as_str())) {
            return self.verdict(MessageCategory::Spam, 1.0, FilterType::KeywordFilter);
        }
        if self.custom_patterns.iter().any(|r| r.is_match(&text)) {
            return self.verdict(MessageCategory::Spam, 1.0, FilterType::RegexFilter);
        }
        if self.phishing_patterns.iter().any(|r| r.is_match(&text)) {
            return self.verdict(MessageCategory::Phishing, 0.9, FilterType::RegexFilter);
        }
        if self.spam_patterns.iter().any(|r| r.is_match(&text)) {
            return self.verdict(MessageCategory::Spam, 0.9, FilterType::RegexFilter);
        }

        let spam = keyword_hits(&text, SPAM_KEYWORDS);
        if spam > 0 {
            // Numeric long-code senders pushing junk keywords are a stronger signal
            let numeric_sender = sender.len() > 6 && sender.chars().all(|c| c.is_ascii_digit() || c == '+');
            let bonus = if numeric_sender { 0.05 } else { 0.0 };
            return self.verdict(MessageCategory::Spam, 0.8 + bonus, FilterType::KeywordFilter);
        }

        let scored = |hits: usize, base: f64| (base + 0.1 * f64::from(u32::try_from(hits).unwrap_or(u32::MAX))).min(0.95);
        let transaction = keyword_hits(&text, TRANSACTION_KEYWORDS);
        if transaction > 0 {
            return self.verdict(MessageCategory::Transaction, scored(transaction, 0.7), FilterType::KeywordFilter);
        }
        let promotional = keyword_hits(&text, PROMOTIONAL_KEYWORDS);
        if promotional > 0 {
            return self.verdict(MessageCategory::Promotional, scored(promotional, 0.6), FilterType::KeywordFilter);
        }
        let notification = keyword_hits(&text, NOTIFICATION_KEYWORDS);
        if notification > 0 {
            return self.verdict(MessageCategory::Notification, scored(notification, 0.6), FilterType::KeywordFilter);
        }

        self.verdict(MessageCategory::Ok, 0.5, FilterType::ContentHeuristic)
    }
}

#[async_trait]
impl Classifier for KeywordClassifier {
    async fn classify(&self, sender: &str, body: &str) -> Result<Classification, ClassifierError> {
        Ok(self.evaluate(sender, body))
    }
}
