//! Log push wire format.
//!
//! ```json
//! { "streams": [{ "stream": { "component": "...", "level": "info", "type": "http" },
//!                 "values": [["<nanos>", "<json encoded body>"]] }] }
//! ```

use serde::Serialize;
use serde_json::{Map, Value};

use crate::redact::truncate;

/// Preview used for bodies that cannot be buffered.
pub const STREAM_BODY: &str = "[stream body]";

/// Preview used for request bodies that are neither JSON nor a form.
pub const OPAQUE_BODY: &str = "[non-JSON body]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// ≥500 → error, ≥400 → warn, anything else → info.
    pub fn from_status(status: u16) -> Self {
        match status {
            500.. => Self::Error,
            400..=499 => Self::Warn,
            _ => Self::Info,
        }
    }
}

/// The `type` label of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventType {
    #[serde(rename = "http")]
    Http,
    #[serde(rename = "db")]
    Db,
    #[serde(rename = "factory")]
    Factory,
    #[serde(rename = "unhandledError")]
    UnhandledError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Labels {
    pub component: String,
    pub level: LogLevel,
    #[serde(rename = "type")]
    pub event_type: EventType,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogStream {
    pub stream: Labels,
    /// `[timestamp nanos, sanitized JSON body]` pairs.
    pub values: Vec<[String; 2]>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogPush {
    pub streams: Vec<LogStream>,
}

impl LogPush {
    /// A push holding exactly one record.
    pub fn single(labels: Labels, timestamp_nanos: String, body: String) -> Self {
        Self {
            streams: vec![LogStream {
                stream: labels,
                values: vec![[timestamp_nanos, body]],
            }],
        }
    }
}

/// What the HTTP logger records per request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpLogData {
    pub authorized: bool,
    pub path: String,
    pub method: String,
    pub status_code: u16,
    pub req_body: Value,
    pub res_body: Value,
}

/// Preview of a buffered body: empty → null, JSON stays structured so
/// nested keys can be redacted, anything else becomes a (truncated) string.
pub fn preview_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    match serde_json::from_slice::<Value>(bytes) {
        Ok(json) => json,
        Err(_) => Value::String(truncate(&String::from_utf8_lossy(bytes))),
    }
}

/// Preview of a buffered request body. Only structured bodies are kept,
/// so every key goes through redaction: JSON as-is, url-encoded forms as
/// a flat object. Any other payload is replaced by [`OPAQUE_BODY`].
pub fn preview_request_body(content_type: Option<&str>, bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    if content_type.is_some_and(is_form) {
        return match serde_urlencoded::from_bytes::<Vec<(String, String)>>(bytes) {
            Ok(pairs) => Value::Object(
                pairs
                    .into_iter()
                    .map(|(k, v)| (k, Value::String(v)))
                    .collect::<Map<_, _>>(),
            ),
            Err(_) => Value::String(OPAQUE_BODY.to_owned()),
        };
    }
    serde_json::from_slice::<Value>(bytes).unwrap_or_else(|_| Value::String(OPAQUE_BODY.to_owned()))
}

fn is_form(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/x-www-form-urlencoded"))
}
