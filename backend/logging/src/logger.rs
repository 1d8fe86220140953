//! Structured Logger
//!
//! Wraps `tracing` with a console layer, a daily rolling NDJSON file, and
//! environment-based level control (`RUST_LOG` wins over the configured level).

use std::path::Path;

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// File name prefix for the rolling log (`sudsline.log.YYYY-MM-DD`).
pub const LOG_FILE_PREFIX: &str = "sudsline.log";

/// Initialize the global structured logger.
///
/// With `json_console` the console layer emits JSON too, which suits running
/// under a process supervisor. Returns `false` if a subscriber was already set.
pub fn init_logger<P: AsRef<Path>>(log_dir: P, level: &str, json_console: bool) -> bool {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, LOG_FILE_PREFIX);
    let file_layer = fmt::layer()
        .json()
        .with_writer(file_appender)
        .with_ansi(false);

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer);

    if json_console {
        registry
            .with(fmt::layer().json().with_writer(std::io::stdout))
            .try_init()
            .is_ok()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stdout)
                    .with_target(false)
                    .with_ansi(true),
            )
            .try_init()
            .is_ok()
    }
}

/// Console-only logger for one-shot CLI commands.
pub fn init_console_logger(level: &str) -> bool {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init()
        .is_ok()
}
