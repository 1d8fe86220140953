//! Config redaction: safe-to-display snapshots with secrets masked.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static SENSITIVE_KEYS: &[&str] = &[
    "apiKey",
    "api_key",
    "token",
    "secret",
    "password",
    "authorization",
];

/// Bare phone numbers, e.g. a default dial-out number.
static PHONE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9]{10,15}$").expect("valid phone regex"));

pub fn redact(value: &Value) -> Value {
    redact_recursive(value, "")
}

fn is_sensitive_key(key: &str) -> bool {
    SENSITIVE_KEYS.iter().any(|k| k.eq_ignore_ascii_case(key))
}

fn redact_string(s: &str, key: &str) -> Value {
    if s.is_empty() {
        return Value::String(String::new());
    }
    if is_sensitive_key(key) {
        let hint: String = s.chars().take(4).collect();
        return Value::String(if s.chars().count() > 8 {
            format!("{hint}***")
        } else {
            "***".to_string()
        });
    }
    if PHONE_PATTERN.is_match(s) {
        let tail: String = s.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
        return Value::String(format!("***{tail}"));
    }
    Value::String(s.to_string())
}

fn redact_recursive(value: &Value, key: &str) -> Value {
    match value {
        Value::String(s) => redact_string(s, key),
        Value::Array(items) => Value::Array(items.iter().map(|v| redact_recursive(v, key)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), redact_recursive(v, k)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Dotted paths of every field `redact` would mask.
pub fn collect_redacted_paths(value: &Value) -> Vec<String> {
    fn walk(value: &Value, path: &str, out: &mut Vec<String>) {
        match value {
            Value::String(s) if !s.is_empty() => {
                let key = path.rsplit('.').next().unwrap_or("");
                if is_sensitive_key(key) || PHONE_PATTERN.is_match(s) {
                    out.push(path.to_string());
                }
            }
            Value::Array(items) => {
                for (i, v) in items.iter().enumerate() {
                    walk(v, &format!("{path}[{i}]"), out);
                }
            }
            Value::Object(map) => {
                for (k, v) in map {
                    let child = if path.is_empty() {
                        k.clone()
                    } else {
                        format!("{path}.{k}")
                    };
                    walk(v, &child, out);
                }
            }
            _ => {}
        }
    }
    let mut paths = Vec::new();
    walk(value, "", &mut paths);
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn masks_api_key() {
        let v = json!({"vendor": {"apiKey": "vapi-0123456789abcdef", "baseUrl": "https://api.vapi.ai"}});
        let out = redact(&v);
        assert_eq!(out["vendor"]["apiKey"], "vapi***");
        assert_eq!(out["vendor"]["baseUrl"], "https://api.vapi.ai");
    }

    #[test]
    fn short_secret_fully_masked() {
        let out = redact(&json!({"apiKey": "abc"}));
        assert_eq!(out["apiKey"], "***");
    }

    #[test]
    fn masks_phone_numbers() {
        let out = redact(&json!({"numbers": ["+15551234567"]}));
        assert_eq!(out["numbers"][0], "***4567");
    }

    #[test]
    fn lists_redacted_paths() {
        let v = json!({"vendor": {"apiKey": "k"}, "session": {"persona": "hi"}});
        assert_eq!(collect_redacted_paths(&v), vec!["vendor.apiKey"]);
    }
}
