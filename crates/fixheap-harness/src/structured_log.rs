//! Structured logging contract for harness runs.
//!
//! Provides:
//! - [`LogEntry`]: canonical JSONL log record with required + optional fields.
//! - [`LogEmitter`]: writes JSONL lines to a file or stdout.
//! - [`validate_log_line`] / [`validate_log_file`]: schema validation.
//! - [`sha256_hex`]: artifact checksumming.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Severity level for log entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

/// Canonical structured log entry.
///
/// Required fields: `timestamp`, `trace_id`, `level`, `event`.
/// Optional fields carry allocator-operation context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    // Required
    pub timestamp: String,
    pub trace_id: String,
    pub level: LogLevel,
    pub event: String,

    // Optional
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ptr: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl LogEntry {
    /// A minimal entry with the required fields set.
    #[must_use]
    pub fn new(timestamp: &str, trace_id: &str, level: LogLevel, event: &str) -> Self {
        Self {
            timestamp: timestamp.to_string(),
            trace_id: trace_id.to_string(),
            level,
            event: event.to_string(),
            op: None,
            ptr: None,
            size: None,
            outcome: None,
            details: None,
        }
    }
}

/// Validation failure for a JSONL log.
#[derive(Debug, Error)]
pub enum LogValidateError {
    #[error("io: {0}")]
    Io(#[from] io::Error),
    #[error("line {line}: {source}")]
    Malformed {
        line: usize,
        source: serde_json::Error,
    },
    #[error("line {line}: field `{field}` must not be empty")]
    EmptyField { line: usize, field: &'static str },
}

/// Validates a single JSONL line against the schema.
pub fn validate_log_line(raw: &str, line: usize) -> Result<LogEntry, LogValidateError> {
    let entry: LogEntry =
        serde_json::from_str(raw).map_err(|source| LogValidateError::Malformed { line, source })?;
    for (field, value) in [
        ("timestamp", &entry.timestamp),
        ("trace_id", &entry.trace_id),
        ("event", &entry.event),
    ] {
        if value.is_empty() {
            return Err(LogValidateError::EmptyField { line, field });
        }
    }
    Ok(entry)
}

/// Validates an entire JSONL file; returns the number of entries.
pub fn validate_log_file(path: &Path) -> Result<usize, LogValidateError> {
    let reader = BufReader::new(File::open(path)?);
    let mut count = 0usize;
    for (idx, raw) in reader.lines().enumerate() {
        let raw = raw?;
        if raw.trim().is_empty() {
            continue;
        }
        validate_log_line(&raw, idx + 1)?;
        count += 1;
    }
    Ok(count)
}

/// Writes JSONL lines to a file or stdout.
pub struct LogEmitter {
    out: Box<dyn Write>,
}

impl LogEmitter {
    #[must_use]
    pub fn stdout() -> Self {
        Self {
            out: Box::new(io::stdout()),
        }
    }

    pub fn file(path: &Path) -> io::Result<Self> {
        Ok(Self {
            out: Box::new(BufWriter::new(File::create(path)?)),
        })
    }

    pub fn emit(&mut self, entry: &LogEntry) -> io::Result<()> {
        let line = serde_json::to_string(entry).map_err(io::Error::other)?;
        writeln!(self.out, "{line}")
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

/// Hex-encoded SHA-256 digest of a file's contents.
pub fn sha256_hex(path: &Path) -> io::Result<String> {
    let bytes = std::fs::read(path)?;
    let digest = Sha256::digest(&bytes);
    Ok(digest.iter().map(|b| format!("{b:02x}")).collect())
}
