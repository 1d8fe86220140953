//! Telemetry and structured logging components for Sudsline.
//!
//! Handles log redaction, JSON output generation, file rotation, and call lifecycle event logging.

pub mod event_logger;
pub mod logger;
pub mod redact;

pub use event_logger::{CallEventLogger, CallLogEntry, CallLogEvent};
pub use logger::{init_console_logger, init_logger};
pub use redact::{mask_phone, redact_sensitive_data};
