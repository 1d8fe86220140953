//! Default values applied after loading.

use crate::schema::{LoggingConfig, ServerConfig, SessionConfig, SudslineConfig, VendorConfig};

pub const DEFAULT_VENDOR_BASE_URL: &str = "https://api.vapi.ai";
pub const DEFAULT_AUDIO_MODE: &str = "server";
pub const DEFAULT_MONITOR_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_MAX_CALL_DURATION_SECS: u64 = 3600;
pub const DEFAULT_LOG_CAPACITY: usize = 100;
pub const DEFAULT_STATUS_LOG_LINES: usize = 10;
pub const DEFAULT_STATUS_HISTORY_RECORDS: usize = 5;
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8088;

/// Fill every unset field that has a default. User values are never overwritten.
pub fn apply_all_defaults(config: SudslineConfig) -> SudslineConfig {
    let config = apply_vendor_defaults(config);
    let config = apply_session_defaults(config);
    let config = apply_logging_defaults(config);
    apply_server_defaults(config)
}

fn apply_vendor_defaults(mut config: SudslineConfig) -> SudslineConfig {
    let vendor = config.vendor.get_or_insert_with(VendorConfig::default);
    vendor
        .base_url
        .get_or_insert_with(|| DEFAULT_VENDOR_BASE_URL.to_string());
    vendor
        .audio_mode
        .get_or_insert_with(|| DEFAULT_AUDIO_MODE.to_string());
    config
}

fn apply_session_defaults(mut config: SudslineConfig) -> SudslineConfig {
    let session = config.session.get_or_insert_with(SessionConfig::default);
    session
        .monitor_interval_secs
        .get_or_insert(DEFAULT_MONITOR_INTERVAL_SECS);
    session
        .max_call_duration_secs
        .get_or_insert(DEFAULT_MAX_CALL_DURATION_SECS);
    session.log_capacity.get_or_insert(DEFAULT_LOG_CAPACITY);
    session.status_log_lines.get_or_insert(DEFAULT_STATUS_LOG_LINES);
    session
        .status_history_records
        .get_or_insert(DEFAULT_STATUS_HISTORY_RECORDS);
    session.heartbeat_logs.get_or_insert(false);
    config
}

fn apply_logging_defaults(mut config: SudslineConfig) -> SudslineConfig {
    let logging = config.logging.get_or_insert_with(LoggingConfig::default);
    logging
        .level
        .get_or_insert_with(|| DEFAULT_LOG_LEVEL.to_string());
    logging.json.get_or_insert(false);
    config
}

fn apply_server_defaults(mut config: SudslineConfig) -> SudslineConfig {
    let server = config.server.get_or_insert_with(ServerConfig::default);
    server.bind.get_or_insert_with(|| DEFAULT_BIND.to_string());
    server.port.get_or_insert(DEFAULT_PORT);
    config
}
