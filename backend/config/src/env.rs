//! `${VAR}` substitution in config values.
//!
//! Names are uppercase `[A-Z_][A-Z0-9_]*`. `${VAR:-fallback}` uses the
//! fallback when the variable is unset or empty. `$${VAR}` is a literal `${VAR}`.

use std::collections::HashMap;

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

static ENV_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$(\$?)\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").expect("valid env reference regex")
});

#[derive(Debug, thiserror::Error)]
#[error("Missing env var \"{var_name}\" referenced at config path: {config_path}")]
pub struct MissingEnvVarError {
    pub var_name: String,
    pub config_path: String,
}

/// Substitute references from the process environment.
pub fn resolve_env_vars(value: &Value) -> Result<Value> {
    resolve_env_vars_with(value, &std::env::vars().collect())
}

/// Substitute references from `env`.
pub fn resolve_env_vars_with(value: &Value, env: &HashMap<String, String>) -> Result<Value> {
    Ok(walk(value, env, "")?)
}

fn walk(
    value: &Value,
    env: &HashMap<String, String>,
    path: &str,
) -> Result<Value, MissingEnvVarError> {
    match value {
        Value::String(s) => Ok(Value::String(substitute(s, env, path)?)),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| walk(v, env, &format!("{path}[{i}]")))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                let child = if path.is_empty() {
                    k.clone()
                } else {
                    format!("{path}.{k}")
                };
                out.insert(k.clone(), walk(v, env, &child)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

fn substitute(
    s: &str,
    env: &HashMap<String, String>,
    path: &str,
) -> Result<String, MissingEnvVarError> {
    if !s.contains("${") {
        return Ok(s.to_string());
    }

    let mut missing: Option<MissingEnvVarError> = None;
    let replaced = ENV_REF.replace_all(s, |caps: &Captures| {
        let name = &caps[2];
        if !caps[1].is_empty() {
            return match caps.get(3) {
                Some(fallback) => format!("${{{}:-{}}}", name, fallback.as_str()),
                None => format!("${{{}}}", name),
            };
        }
        match env.get(name).filter(|v| !v.is_empty()) {
            Some(v) => v.clone(),
            None => match caps.get(3) {
                Some(fallback) => fallback.as_str().to_string(),
                None => {
                    missing.get_or_insert_with(|| MissingEnvVarError {
                        var_name: name.to_string(),
                        config_path: path.to_string(),
                    });
                    String::new()
                }
            },
        }
    });

    match missing {
        Some(err) => Err(err),
        None => Ok(replaced.into_owned()),
    }
}

/// Env var names referenced anywhere in `value`, sorted and deduplicated.
pub fn collect_referenced_vars(value: &Value) -> Vec<String> {
    fn collect(value: &Value, out: &mut Vec<String>) {
        match value {
            Value::String(s) => out.extend(
                ENV_REF
                    .captures_iter(s)
                    .filter(|c| c[1].is_empty())
                    .map(|c| c[2].to_string()),
            ),
            Value::Array(items) => items.iter().for_each(|v| collect(v, out)),
            Value::Object(map) => map.values().for_each(|v| collect(v, out)),
            _ => {}
        }
    }
    let mut vars = Vec::new();
    collect(value, &mut vars);
    vars.sort();
    vars.dedup();
    vars
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn substitutes_nested_values() {
        let v = json!({"vendor": {"apiKey": "${VAPI_API_KEY}"}, "list": ["x-${SUFFIX}"]});
        let out = resolve_env_vars_with(&v, &env(&[("VAPI_API_KEY", "k-1"), ("SUFFIX", "y")])).unwrap();
        assert_eq!(out["vendor"]["apiKey"], "k-1");
        assert_eq!(out["list"][0], "x-y");
    }

    #[test]
    fn missing_var_names_path() {
        let v = json!({"vendor": {"apiKey": "${VAPI_API_KEY}"}});
        let err = resolve_env_vars_with(&v, &HashMap::new()).unwrap_err().to_string();
        assert!(err.contains("VAPI_API_KEY"));
        assert!(err.contains("vendor.apiKey"));
    }

    #[test]
    fn fallback_and_escape() {
        let v = json!({"a": "${PORT:-8088}", "b": "$${KEEP}", "c": "plain"});
        let out = resolve_env_vars_with(&v, &HashMap::new()).unwrap();
        assert_eq!(out["a"], "8088");
        assert_eq!(out["b"], "${KEEP}");
        assert_eq!(out["c"], "plain");
    }

    #[test]
    fn empty_value_counts_as_missing() {
        let v = json!({"k": "${EMPTY}"});
        assert!(resolve_env_vars_with(&v, &env(&[("EMPTY", "")])).is_err());
    }

    #[test]
    fn collects_names() {
        let v = json!({"a": "${FOO}", "b": {"c": "${BAR} $${SKIP}"}});
        assert_eq!(collect_referenced_vars(&v), vec!["BAR", "FOO"]);
    }
}
