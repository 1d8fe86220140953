//! Call-session management for the operator desk.
//!
//! A `CallSessionManager` holds the one call slot, its monitor task, the
//! operator log, history and analytics. State changes are published as
//! `CallEvent`s on a broadcast channel.

pub mod log_buffer;
pub mod manager;
pub mod monitor;
pub mod prompt;
pub mod settings;

pub use log_buffer::{LogBuffer, DEFAULT_LOG_CAPACITY};
pub use manager::{
    CallOutcome, CallSessionManager, CurrentCall, StartCallRequest, StatusSnapshot,
    CLEANUP_REASON, OPERATOR_STOP_REASON,
};
pub use monitor::{REMOTE_HANGUP_REASON, WATCHDOG_REASON};
pub use prompt::{system_prompt, DEFAULT_PERSONA};
pub use settings::SessionSettings;
