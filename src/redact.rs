//! Recursive scrubbing of log payloads before they leave the process.
//!
//! Values under a sensitive key are replaced by [`MASK`] whatever their
//! type, arrays are walked element-wise, and long strings are cut to
//! [`MAX_LEN`] characters followed by [`TRUNCATION_MARKER`].

use serde::Serialize;
use serde_json::{Map, Value};

pub const MASK: &str = "*****";
pub const MAX_LEN: usize = 5_000;
pub const TRUNCATION_MARKER: &str = "…[truncated]";
pub const UNSERIALIZABLE: &str = "[Unserializable log data]";

/// Compared against the lower-cased key.
const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "pass",
    "pwd",
    "authorization",
    "auth",
    "token",
    "access_token",
    "refresh_token",
    "apikey",
    "secret",
    "client_secret",
    "ssn",
    "card",
    "creditcard",
    "jwt",
];

pub fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    SENSITIVE_KEYS.contains(&lower.as_str())
}

/// Cut a string to `MAX_LEN` characters plus the marker; shorter strings
/// come back untouched.
pub fn truncate(s: &str) -> String {
    match s.char_indices().nth(MAX_LEN) {
        Some((cut, _)) => {
            let mut out = String::with_capacity(cut + TRUNCATION_MARKER.len());
            out.push_str(&s[..cut]);
            out.push_str(TRUNCATION_MARKER);
            out
        }
        None => s.to_string(),
    }
}

/// Return a scrubbed copy of `value`.
pub fn redact(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(truncate(s)),
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, val) in map {
                let scrubbed = if is_sensitive_key(key) {
                    Value::String(MASK.to_string())
                } else {
                    redact(val)
                };
                out.insert(key.clone(), scrubbed);
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

/// Redact anything serializable and encode it as a JSON string.
///
/// Structures serde cannot represent as JSON (e.g. maps with non-string
/// keys) turn into the JSON-encoded placeholder instead of an error.
pub fn sanitize<T: Serialize + ?Sized>(data: &T) -> String {
    let encoded = serde_json::to_value(data).and_then(|v| serde_json::to_string(&redact(&v)));
    match encoded {
        Ok(json) => json,
        Err(e) => {
            tracing::debug!(error = %e, "log payload not serializable");
            placeholder()
        }
    }
}

fn placeholder() -> String {
    format!("\"{UNSERIALIZABLE}\"")
}
