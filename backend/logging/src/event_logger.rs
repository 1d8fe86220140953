//! Call Event Logger
//!
//! Structured call lifecycle events written through `tracing` under the
//! `call_events` target, so the JSON file layer captures them as NDJSON.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::redact::redact_sensitive_data;

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum CallLogEvent {
    CallStarted {
        assistant_id: String,
        phone_number: Option<String>,
        vendor_call_id: Option<String>,
    },
    CallEnded {
        status: String,
        reason: String,
        duration_secs: Option<i64>,
    },
    StartRejected {
        reason: String,
    },
    VendorError {
        error_msg: String,
    },
    MonitorTick {
        elapsed_secs: i64,
    },
}

#[derive(Debug, Serialize)]
pub struct CallLogEntry {
    pub call_id: String,
    pub timestamp: DateTime<Utc>,
    pub event: CallLogEvent,
}

pub struct CallEventLogger;

impl CallEventLogger {
    /// Redacts customer data and emits the event.
    pub fn log_event(call_id: &str, mut event: CallLogEvent) {
        match &mut event {
            CallLogEvent::CallStarted { phone_number, .. } => {
                if let Some(number) = phone_number {
                    *number = redact_sensitive_data(number);
                }
            }
            CallLogEvent::CallEnded { reason, .. } | CallLogEvent::StartRejected { reason } => {
                *reason = redact_sensitive_data(reason);
            }
            CallLogEvent::VendorError { error_msg } => {
                *error_msg = redact_sensitive_data(error_msg);
            }
            CallLogEvent::MonitorTick { .. } => {}
        }

        let is_error = matches!(event, CallLogEvent::VendorError { .. });
        let entry = CallLogEntry {
            call_id: call_id.into(),
            timestamp: Utc::now(),
            event,
        };
        let payload = serde_json::to_string(&entry).unwrap_or_default();

        if is_error {
            warn!(target: "call_events", event = %payload, "Call event");
        } else {
            info!(target: "call_events", event = %payload, "Call event");
        }
    }
}
