//! Config validation with field paths in every message.

use std::collections::HashSet;

use thiserror::Error;

use crate::schema::SudslineConfig;

#[derive(Debug, Error)]
#[error("Config validation error at '{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }
}

pub fn validate(config: &SudslineConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_vendor(config, &mut report);
    validate_assistants(config, &mut report);
    validate_session(config, &mut report);
    validate_logging(config, &mut report);
    validate_server(config, &mut report);
    report
}

fn validate_vendor(config: &SudslineConfig, report: &mut ValidationReport) {
    let vendor = config.vendor.clone().unwrap_or_default();

    if vendor.api_key.as_deref().map(str::trim).unwrap_or("").is_empty() {
        report.warn("vendor.apiKey", "No API key configured; calls will fail to start");
    }
    if vendor.phone_number_id.as_deref().map(str::trim).unwrap_or("").is_empty() {
        report.warn(
            "vendor.phoneNumberId",
            "No phoneNumberId configured; outbound calls may be rejected by the vendor",
        );
    }
    let has_value = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
    if has_value(&vendor.model_provider) != has_value(&vendor.model) {
        report.warn(
            "vendor.model",
            "Set both modelProvider and model; the system prompt only reaches assistants that use {{systemPrompt}}",
        );
    }
    if let Some(url) = &vendor.base_url {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            report.error("vendor.baseUrl", format!("'{url}' is not an http(s) URL"));
        }
    }
    if let Some(mode) = &vendor.audio_mode {
        if !matches!(mode.as_str(), "server" | "local") {
            report.error(
                "vendor.audioMode",
                format!("Unknown audio mode '{mode}'. Use 'server' or 'local'"),
            );
        }
    }
}

fn validate_assistants(config: &SudslineConfig, report: &mut ValidationReport) {
    if config.assistants.is_empty() {
        report.warn("assistants", "No assistants configured; start requests must name one");
    }
    let mut seen = HashSet::new();
    for (i, assistant) in config.assistants.iter().enumerate() {
        let id = assistant.id.trim();
        if id.is_empty() {
            report.error(format!("assistants[{i}].id"), "Assistant id cannot be empty");
            continue;
        }
        if !seen.insert(id) {
            report.error(format!("assistants[{i}].id"), format!("Duplicate assistant id '{id}'"));
        }
    }
}

fn validate_session(config: &SudslineConfig, report: &mut ValidationReport) {
    let Some(session) = &config.session else { return };
    if session.monitor_interval_secs == Some(0) {
        report.error("session.monitorIntervalSecs", "monitorIntervalSecs must be >= 1");
    }
    if session.max_call_duration_secs == Some(0) {
        report.error("session.maxCallDurationSecs", "maxCallDurationSecs must be >= 1");
    }
    if session.log_capacity == Some(0) {
        report.error("session.logCapacity", "logCapacity must be >= 1");
    }
    if let (Some(interval), Some(max)) = (session.monitor_interval_secs, session.max_call_duration_secs) {
        if interval > 0 && max > 0 && max < interval {
            report.warn(
                "session.maxCallDurationSecs",
                format!("maxCallDurationSecs ({max}) is shorter than monitorIntervalSecs ({interval}); the watchdog fires on the first tick"),
            );
        }
    }
}

fn validate_logging(config: &SudslineConfig, report: &mut ValidationReport) {
    let Some(level) = config.logging.as_ref().and_then(|l| l.level.as_deref()) else {
        return;
    };
    if !matches!(level, "trace" | "debug" | "info" | "warn" | "error") {
        report.warn(
            "logging.level",
            format!("Unknown level '{level}'; RUST_LOG syntax will be tried as-is"),
        );
    }
}

fn validate_server(config: &SudslineConfig, report: &mut ValidationReport) {
    let Some(server) = &config.server else { return };
    match server.port {
        Some(0) => report.error("server.port", "port must be > 0"),
        Some(port) if port < 1024 => report.warn(
            "server.port",
            format!("Port {port} requires elevated privileges; consider using a port >= 1024"),
        ),
        _ => {}
    }
}
