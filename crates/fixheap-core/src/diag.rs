//! Diagnostic sink collaborator.
//!
//! The allocator reports anomalies (double frees, out-of-memory,
//! corruption, heap dumps) through a sink supplied at construction
//! time rather than a global logger. The contract is a single method:
//! accept a formatted human-readable line at a given severity.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

/// Severity ladder for diagnostic lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Trace => "trace",
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

/// Receives formatted diagnostic lines from the allocator.
///
/// Implementations must not call back into the allocator.
pub trait DiagnosticSink {
    fn emit(&self, severity: Severity, line: &str);
}

/// Default sink: writes `[severity] fixheap: line` to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrSink;

impl DiagnosticSink for StderrSink {
    fn emit(&self, severity: Severity, line: &str) {
        eprintln!("[{severity}] fixheap: {line}");
    }
}

/// Discards every line.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn emit(&self, _severity: Severity, _line: &str) {}
}

/// Captures emitted lines in memory.
///
/// Cloning shares the underlying buffer, so a test can keep one handle
/// and hand the other to the allocator.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    entries: Arc<Mutex<Vec<(Severity, String)>>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far.
    #[must_use]
    pub fn entries(&self) -> Vec<(Severity, String)> {
        self.entries.lock().clone()
    }

    /// Whether any line at `severity` contains `needle`.
    #[must_use]
    pub fn contains(&self, severity: Severity, needle: &str) -> bool {
        self.entries
            .lock()
            .iter()
            .any(|(s, line)| *s == severity && line.contains(needle))
    }
}

impl DiagnosticSink for MemorySink {
    fn emit(&self, severity: Severity, line: &str) {
        self.entries.lock().push((severity, line.to_string()));
    }
}
