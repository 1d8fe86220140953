use std::time::Duration;

use crate::log_buffer::DEFAULT_LOG_CAPACITY;
use crate::prompt::DEFAULT_PERSONA;

/// Tuning for a `CallSessionManager`.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// How often the monitor polls the vendor while a call is active.
    pub monitor_interval: Duration,
    /// Watchdog limit; `None` lets a call run until stopped or hung up.
    pub max_call_duration: Option<Duration>,
    pub log_capacity: usize,
    /// Log lines included in a status snapshot.
    pub status_log_lines: usize,
    /// History records included in a status snapshot.
    pub status_history_records: usize,
    /// Write a heartbeat line to the operator log on every monitor tick.
    pub heartbeat_logs: bool,
    pub persona: String,
    pub event_capacity: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            monitor_interval: Duration::from_secs(10),
            max_call_duration: Some(Duration::from_secs(3600)),
            log_capacity: DEFAULT_LOG_CAPACITY,
            status_log_lines: 10,
            status_history_records: 5,
            heartbeat_logs: false,
            persona: DEFAULT_PERSONA.to_string(),
            event_capacity: 128,
        }
    }
}
