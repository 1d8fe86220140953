//! Config file location, reading, and atomic writes.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::schema::SudslineConfig;

const CONFIG_FILE_NAME: &str = "config.yaml";

/// Rolling backups kept by `write_config`.
const MAX_BACKUPS: usize = 3;

/// `SUDSLINE_CONFIG_DIR` if set, else `~/.sudsline`.
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("SUDSLINE_CONFIG_DIR") {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    match dirs::home_dir() {
        Some(home) => home.join(".sudsline"),
        None => PathBuf::from(".sudsline"),
    }
}

pub fn config_file_path(config_dir: &Path) -> PathBuf {
    config_dir.join(CONFIG_FILE_NAME)
}

/// Read the file as an untyped tree so `${VAR}` references can be resolved
/// before typed parsing. A missing or empty file yields an empty object.
pub async fn load_config_value(path: &Path) -> Result<Value> {
    if !path.exists() {
        debug!(path = %path.display(), "Config file does not exist; using defaults");
        return Ok(Value::Object(Default::default()));
    }

    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }

    let value: Value = serde_yaml::from_str(&raw)
        .with_context(|| format!("Failed to parse config YAML at: {}", path.display()))?;
    info!(path = %path.display(), "Loaded config");
    Ok(value)
}

/// Parse the file as-is, without env substitution or defaults.
pub async fn load_config(path: &Path) -> Result<SudslineConfig> {
    let value = load_config_value(path).await?;
    serde_json::from_value(value)
        .with_context(|| format!("Invalid config structure in: {}", path.display()))
}

/// Write to a temp file and rename over the target, keeping a few backups.
pub async fn write_config(config: &SudslineConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.with_context(|| {
            format!("Failed to create config directory: {}", parent.display())
        })?;
    }

    if path.exists() {
        rotate_backups(path).await;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize config to YAML")?;
    let tmp_path = path.with_extension("yaml.tmp");
    fs::write(&tmp_path, yaml.as_bytes())
        .await
        .with_context(|| format!("Failed to write temp config: {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("Failed to rename temp config to: {}", path.display()))?;

    info!(path = %path.display(), "Wrote config");
    Ok(())
}

async fn rotate_backups(path: &Path) {
    for i in (1..MAX_BACKUPS).rev() {
        let old = path.with_extension(format!("yaml.bak.{}", i));
        let new = path.with_extension(format!("yaml.bak.{}", i + 1));
        if old.exists() {
            if let Err(e) = fs::rename(&old, &new).await {
                warn!(backup = %old.display(), error = %e, "Failed to rotate config backup");
            }
        }
    }

    let bak = path.with_extension("yaml.bak.1");
    if let Err(e) = fs::copy(path, &bak).await {
        warn!(backup = %bak.display(), error = %e, "Failed to create config backup");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AssistantEntry, ServerConfig};

    fn temp_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("sudsline-config-{}-{}", std::process::id(), name))
    }

    #[tokio::test]
    async fn missing_file_is_empty_object() {
        let value = load_config_value(Path::new("/nonexistent/sudsline/config.yaml"))
            .await
            .unwrap();
        assert_eq!(value, Value::Object(Default::default()));
    }

    #[tokio::test]
    async fn write_then_load_keeps_backup() {
        let dir = temp_dir("roundtrip");
        let path = config_file_path(&dir);
        let mut cfg = SudslineConfig::default();
        cfg.assistants.push(AssistantEntry {
            id: "A1".into(),
            name: "Helper".into(),
        });
        write_config(&cfg, &path).await.unwrap();

        cfg.server = Some(ServerConfig {
            port: Some(9000),
            ..Default::default()
        });
        write_config(&cfg, &path).await.unwrap();

        let loaded = load_config(&path).await.unwrap();
        assert_eq!(loaded, cfg);
        assert!(path.with_extension("yaml.bak.1").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
