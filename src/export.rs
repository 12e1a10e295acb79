//! Export of stored verdicts
//!
//! CSV is the interchange format shared with spreadsheets; JSON keeps the
//! enum fields in their canonical spellings for scripts.

use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use csv::Writer;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, TriageError};
use crate::metrics;
use crate::models::FilteredMessage;
use crate::validation::InputValidator;

/// CSV header, in column order
pub const CSV_HEADER: [&str; 10] = [
    "ID",
    "Sender",
    "Message",
    "Received Date",
    "Category",
    "Confidence",
    "Filter Type",
    "Is Blocked",
    "Is User Override",
    "Is Read",
];

/// Date layout used in the CSV, always UTC
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Output format for [`export_to_file`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Comma-separated values with a header row
    Csv,
    /// Pretty-printed JSON array
    Json,
}

impl FromStr for ExportFormat {
    type Err = TriageError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            other => Err(TriageError::ConstraintViolation(format!(
                "Unsupported export format: {other}"
            ))),
        }
    }
}

/// Write `messages` as CSV to `writer`
pub fn write_csv<W: Write>(messages: &[FilteredMessage], writer: W) -> Result<()> {
    let mut csv = Writer::from_writer(writer);
    csv.write_record(CSV_HEADER)?;

    for message in messages {
        csv.write_record([
            message.id.to_string(),
            message.sender.clone(),
            message.message_body.clone(),
            message.received_at.format(DATE_FORMAT).to_string(),
            message.category.to_string(),
            format!("{:.2}", message.confidence),
            message.filter_type.to_string(),
            message.is_blocked.to_string(),
            message.is_user_override.to_string(),
            message.is_read.to_string(),
        ])?;
    }

    csv.flush()?;
    Ok(())
}

/// Write `messages` as a JSON array to `writer`
pub fn write_json<W: Write>(messages: &[FilteredMessage], writer: W) -> Result<()> {
    serde_json::to_writer_pretty(writer, messages)?;
    Ok(())
}

/// Write `messages` to `path`, creating parent directories as needed
pub fn export_to_file(messages: &[FilteredMessage], format: ExportFormat, path: &Path) -> Result<()> {
    InputValidator::validate_file_path(path)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            create_dir_all(parent)?;
        }
    }

    let mut writer = BufWriter::new(File::create(path)?);
    match format {
        ExportFormat::Csv => write_csv(messages, &mut writer)?,
        ExportFormat::Json => write_json(messages, &mut writer)?,
    }
    writer.flush()?;

    metrics::record_export(messages.len());
    info!(rows = messages.len(), path = %path.display(), ?format, "messages exported");
    Ok(())
}
