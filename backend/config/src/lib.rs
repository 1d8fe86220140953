//! `sudsline-config`: runtime configuration for the call desk.
//!
//! Provides:
//! - Typed config schema (vendor, assistants, session, logging, server, store)
//! - YAML read/write with backup rotation
//! - `${ENV_VAR}` substitution
//! - Default value application
//! - Validation with errors and warnings
//! - Redaction for safe display

pub mod defaults;
pub mod env;
pub mod io;
pub mod redact;
pub mod schema;
pub mod validation;

pub use defaults::apply_all_defaults;
pub use env::{collect_referenced_vars, resolve_env_vars, resolve_env_vars_with, MissingEnvVarError};
pub use io::{config_dir, config_file_path, load_config, load_config_value, write_config};
pub use redact::{collect_redacted_paths, redact};
pub use schema::{
    AssistantEntry, LoggingConfig, ServerConfig, SessionConfig, StoreConfig, SudslineConfig,
    VendorConfig,
};
pub use validation::{validate, ConfigValidationError, ValidationReport};

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde_json::Value;

/// Load, substitute env vars, apply defaults, and validate.
///
/// Warnings are logged. Any validation error fails the load.
pub async fn load_and_prepare(path: &Path) -> Result<SudslineConfig> {
    let raw = load_config_value(path).await?;
    prepare(raw, &std::env::vars().collect())
}

/// The processing half of `load_and_prepare`, for an already-parsed tree.
pub fn prepare(raw: Value, env: &HashMap<String, String>) -> Result<SudslineConfig> {
    let value = resolve_env_vars_with(&raw, env).context("Failed to resolve env vars in config")?;
    let config: SudslineConfig =
        serde_json::from_value(value).context("Failed to deserialize config after processing")?;
    let config = apply_all_defaults(config);

    let report = validate(&config);
    for warning in &report.warnings {
        tracing::warn!(path = %warning.path, message = %warning.message, "Config warning");
    }
    for error in &report.errors {
        tracing::error!(path = %error.path, message = %error.message, "Config error");
    }
    if !report.is_valid() {
        let joined: Vec<String> = report.errors.iter().map(|e| e.to_string()).collect();
        bail!("Invalid config: {}", joined.join("; "));
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn prepare_resolves_env_and_defaults() {
        let raw = yaml(
            r#"
vendor:
  apiKey: ${VAPI_API_KEY}
assistants:
  - id: A1
    name: Helper
"#,
        );
        let env = HashMap::from([("VAPI_API_KEY".to_string(), "secret-key".to_string())]);
        let cfg = prepare(raw, &env).unwrap();
        let vendor = cfg.vendor.unwrap();
        assert_eq!(vendor.api_key.as_deref(), Some("secret-key"));
        assert_eq!(vendor.base_url.as_deref(), Some(defaults::DEFAULT_VENDOR_BASE_URL));
        assert_eq!(cfg.session.unwrap().monitor_interval_secs, Some(10));
    }

    #[test]
    fn prepare_rejects_invalid_config() {
        let raw = yaml("session:\n  logCapacity: 0\n");
        let err = prepare(raw, &HashMap::new()).unwrap_err().to_string();
        assert!(err.contains("logCapacity"));
    }

    #[test]
    fn prepare_reports_missing_env() {
        let raw = yaml("vendor:\n  apiKey: ${NOT_SET_ANYWHERE}\n");
        assert!(prepare(raw, &HashMap::new()).is_err());
    }

    #[tokio::test]
    async fn load_missing_file_gives_defaults() {
        let cfg = load_and_prepare(Path::new("/nonexistent/sudsline/config.yaml"))
            .await
            .unwrap();
        assert_eq!(cfg.server.unwrap().port, Some(defaults::DEFAULT_PORT));
    }
}
