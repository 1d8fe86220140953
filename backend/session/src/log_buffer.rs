//! Bounded operator log.
//!
//! Keeps the newest `capacity` lines for the console and mirrors every line
//! into `tracing` with customer data redacted.

use std::collections::VecDeque;

use tracing::{error, info, warn};

use logging::redact_sensitive_data;
use sudsline_core::{LogEntry, LogLevel};

pub const DEFAULT_LOG_CAPACITY: usize = 100;

#[derive(Debug, Clone)]
pub struct LogBuffer {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a line, evicting the oldest when full. Returns the stored entry.
    pub fn push(&mut self, level: LogLevel, message: impl Into<String>) -> LogEntry {
        let entry = LogEntry::new(level, message);
        let safe = redact_sensitive_data(&entry.message);
        match level {
            LogLevel::Error => error!(target: "operator_log", "{}", safe),
            LogLevel::Warning => warn!(target: "operator_log", "{}", safe),
            LogLevel::Info | LogLevel::Success => info!(target: "operator_log", level = %level, "{}", safe),
        }

        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry.clone());
        entry
    }

    /// The newest `n` lines, oldest first.
    pub fn recent(&self, n: usize) -> Vec<LogEntry> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
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
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}
