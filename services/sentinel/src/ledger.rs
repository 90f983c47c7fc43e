//! Most-recent-first event log with consecutive-duplicate suppression.

use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};
use std::collections::VecDeque;
use std::fmt;

/// Default number of entries kept
pub const DEFAULT_CAPACITY: usize = 50;

/// Severity of a logged event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Alert,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Alert => "alert",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub message: String,
    #[serde(rename = "type")]
    pub severity: Severity,
}

/// Bounded event trail, newest entry at the front.
#[derive(Debug, Clone, PartialEq)]
pub struct LogLedger {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl LogLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Returns a new ledger with the entry prepended.
    ///
    /// A no-op when the current front entry carries the same message text,
    /// whatever its severity or timestamp.
    pub fn record(&self, timestamp: &str, message: &str, severity: Severity) -> Self {
        let mut next = self.clone();
        next.push_front(timestamp, message, severity);
        next
    }

    /// In-place variant of [`record`](Self::record). Returns whether an entry
    /// was inserted.
    pub(crate) fn push_front(&mut self, timestamp: &str, message: &str, severity: Severity) -> bool {
        if self.front().is_some_and(|e| e.message == message) {
            return false;
        }

        self.entries.push_front(LogEntry {
            timestamp: timestamp.to_string(),
            message: message.to_string(),
            severity,
        });
        self.entries.truncate(self.capacity);
        true
    }

    pub fn front(&self) -> Option<&LogEntry> {
        self.entries.front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries newest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &LogEntry> {
        self.entries.iter()
    }
}

impl Default for LogLedger {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Serialize for LogLedger {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(self.entries.len()))?;
        for entry in &self.entries {
            seq.serialize_element(entry)?;
        }
        seq.end()
    }
}
