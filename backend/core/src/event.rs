use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::CallRecord;

/// Severity tag for operator log lines.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Success,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Success => "SUCCESS",
        };
        write!(f, "{}", s)
    }
}

/// One line in the operator log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for LogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.timestamp.format("%H:%M:%S"),
            self.level,
            self.message
        )
    }
}

/// State transitions published by the call-session manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallEvent {
    /// A call reached the active state.
    Started { record: CallRecord },
    /// A call was finalized (operator stop, remote hang-up, watchdog, or cleanup).
    Ended { record: CallRecord },
    /// A start attempt failed before any record was created.
    Failed {
        reason: String,
        phone_number: Option<String>,
    },
    /// Periodic tick from the monitor while a call is active.
    Heartbeat { call_id: Uuid, elapsed_secs: i64 },
    /// A line was appended to the operator log.
    Log { entry: LogEntry },
    LogsCleared,
    HistoryCleared,
}

impl CallEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
            Self::Ended { .. } => "ended",
            Self::Failed { .. } => "failed",
            Self::Heartbeat { .. } => "heartbeat",
            Self::Log { .. } => "log",
            Self::LogsCleared => "logs_cleared",
            Self::HistoryCleared => "history_cleared",
        }
    }

    /// Record id for events tied to one call.
    pub fn call_id(&self) -> Option<Uuid> {
        match self {
            Self::Started { record } | Self::Ended { record } => Some(record.id),
            Self::Heartbeat { call_id, .. } => Some(*call_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CallType;

    #[test]
    fn test_event_serialization() {
        let record = CallRecord::new("A1", "Helper", CallType::Outbound);
        let id = record.id;
        let event = CallEvent::Started { record };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "started");
        let back: CallEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back.call_id(), Some(id));
        assert_eq!(back.kind(), "started");
    }

    #[test]
    fn test_log_entry_display() {
        let entry = LogEntry::new(LogLevel::Warning, "audio unavailable");
        let line = entry.to_string();
        assert!(line.contains("WARNING: audio unavailable"));
    }

    #[test]
    fn test_unit_events_have_no_call_id() {
        assert!(CallEvent::HistoryCleared.call_id().is_none());
        assert_eq!(CallEvent::LogsCleared.kind(), "logs_cleared");
    }
}
