//! Runtime settings derived from the loaded `SudslineConfig`.

use std::path::PathBuf;
use std::time::Duration;

use sudsline_config::{defaults, SudslineConfig};
use sudsline_session::SessionSettings;
use sudsline_vendor::{AudioMode, VapiConfig};

/// Everything the binary needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    pub port: u16,
    pub log_level: String,
    pub log_dir: Option<PathBuf>,
    pub log_json: bool,
    pub store_path: Option<PathBuf>,
    pub vendor: VapiConfig,
    pub session: SessionSettings,
}

impl Config {
    /// Expects a config that has been through `apply_all_defaults`.
    pub fn from_file(file: &SudslineConfig) -> Self {
        let server = file.server.clone().unwrap_or_default();
        let logging = file.logging.clone().unwrap_or_default();

        Self {
            bind_address: server.bind.unwrap_or_else(|| defaults::DEFAULT_BIND.to_string()),
            port: server.port.unwrap_or(defaults::DEFAULT_PORT),
            log_level: logging
                .level
                .unwrap_or_else(|| defaults::DEFAULT_LOG_LEVEL.to_string()),
            log_dir: logging.dir.map(PathBuf::from),
            log_json: logging.json.unwrap_or(false),
            store_path: file
                .store
                .as_ref()
                .and_then(|s| s.path.as_deref())
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
            vendor: vendor_config(file),
            session: session_settings(file),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

fn vendor_config(file: &SudslineConfig) -> VapiConfig {
    let vendor = file.vendor.clone().unwrap_or_default();
    VapiConfig {
        base_url: vendor
            .base_url
            .unwrap_or_else(|| defaults::DEFAULT_VENDOR_BASE_URL.to_string()),
        api_key: vendor.api_key.unwrap_or_default(),
        phone_number_id: vendor.phone_number_id.filter(|id| !id.trim().is_empty()),
        audio_mode: match vendor.audio_mode.as_deref() {
            Some("local") => AudioMode::Local,
            _ => AudioMode::Server,
        },
        model_provider: vendor.model_provider.filter(|p| !p.trim().is_empty()),
        model: vendor.model.filter(|m| !m.trim().is_empty()),
    }
}

fn session_settings(file: &SudslineConfig) -> SessionSettings {
    let session = file.session.clone().unwrap_or_default();
    let base = SessionSettings::default();
    SessionSettings {
        monitor_interval: session
            .monitor_interval_secs
            .map(Duration::from_secs)
            .unwrap_or(base.monitor_interval),
        max_call_duration: session
            .max_call_duration_secs
            .map(Duration::from_secs)
            .or(base.max_call_duration),
        log_capacity: session.log_capacity.unwrap_or(base.log_capacity),
        status_log_lines: session.status_log_lines.unwrap_or(base.status_log_lines),
        status_history_records: session
            .status_history_records
            .unwrap_or(base.status_history_records),
        heartbeat_logs: session.heartbeat_logs.unwrap_or(base.heartbeat_logs),
        persona: session
            .persona
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(base.persona),
        event_capacity: base.event_capacity,
    }
}
