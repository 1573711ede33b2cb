//! Reporting capability passed into each component.
//!
//! Components never log through global state directly; they receive a
//! `&dyn Reporter`. The binary uses [`LogReporter`], which forwards to the
//! `log` facade, and tests use [`RecordingReporter`] to assert on what was
//! reported.

use std::sync::Mutex;

/// Severity of a reported message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
}

/// Sink for informational and warning messages.
pub trait Reporter: Send + Sync {
    /// Report routine progress (renames, file writes, row counts).
    fn info(&self, message: &str);

    /// Report a recoverable discrepancy.
    fn warn(&self, message: &str);
}

/// Reporter that forwards to the `log` crate.
#[derive(Debug, Clone)]
pub struct LogReporter {
    target: &'static str,
}

impl LogReporter {
    /// Create a reporter logging under the given target.
    pub fn new(target: &'static str) -> Self {
        Self { target }
    }
}

impl Default for LogReporter {
    fn default() -> Self {
        Self::new("specimen_align")
    }
}

impl Reporter for LogReporter {
    fn info(&self, message: &str) {
        log::info!(target: self.target, "{}", message);
    }

    fn warn(&self, message: &str) {
        log::warn!(target: self.target, "{}", message);
    }
}

/// Reporter that keeps every message in memory.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    entries: Mutex<Vec<(Severity, String)>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded messages in arrival order.
    pub fn entries(&self) -> Vec<(Severity, String)> {
        self.entries
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Messages recorded at warning severity.
    pub fn warnings(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|(s, _)| *s == Severity::Warning)
            .map(|(_, m)| m)
            .collect()
    }

    /// Messages recorded at info severity.
    pub fn infos(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|(s, _)| *s == Severity::Info)
            .map(|(_, m)| m)
            .collect()
    }

    fn push(&self, severity: Severity, message: &str) {
        if let Ok(mut guard) = self.entries.lock() {
            guard.push((severity, message.to_string()));
        }
    }
}

impl Reporter for RecordingReporter {
    fn info(&self, message: &str) {
        self.push(Severity::Info, message);
    }

    fn warn(&self, message: &str) {
        self.push(Severity::Warning, message);
    }
}
