//! Per-request log record built around the response, not inside handlers.
//!
//! The request and response bodies are buffered once so they can be
//! previewed, then handed on byte-for-byte. Status and headers are never
//! touched. Bodies without an exact, bounded length (streams, SSE) are
//! passed through untouched and previewed as `"[stream body]"`.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body, Bytes, HttpBody},
    extract::{OriginalUri, Request, State},
    http::{
        header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE},
        HeaderMap,
    },
    middleware::Next,
    response::Response,
};
use serde_json::Value;

use crate::logs::{preview_body, preview_request_body, HttpLogData, LogEmitter, STREAM_BODY};

/// Largest body the logger will buffer.
pub const MAX_CAPTURE_BYTES: u64 = 1024 * 1024;

pub async fn log_http(State(emitter): State<Arc<LogEmitter>>, req: Request, next: Next) -> Response {
    let authorized = req.headers().contains_key(AUTHORIZATION);
    let method = req.method().to_string();
    let path = original_path(&req);

    let (mut req_parts, req_body) = req.into_parts();
    let content_type = req_parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let captured = capture(req_body).await;
    let (req_preview, req_body) = reassemble(&mut req_parts.headers, captured, |bytes| {
        preview_request_body(content_type.as_deref(), bytes)
    });
    let response = next.run(Request::from_parts(req_parts, req_body)).await;

    let status_code = response.status().as_u16();
    let (mut res_parts, res_body) = response.into_parts();
    let captured = capture(res_body).await;
    let (res_preview, res_body) = reassemble(&mut res_parts.headers, captured, preview_body);

    emitter.http(HttpLogData {
        authorized,
        path,
        method,
        status_code,
        req_body: req_preview,
        res_body: res_preview,
    });

    Response::from_parts(res_parts, res_body)
}

/// Path and query as the client sent them, before any nesting stripped
/// a prefix.
fn original_path(req: &Request) -> String {
    let uri = req
        .extensions()
        .get::<OriginalUri>()
        .map(|original| &original.0)
        .unwrap_or_else(|| req.uri());
    uri.path_and_query()
        .map(|pq| pq.as_str().to_owned())
        .unwrap_or_else(|| uri.path().to_owned())
}

/// Outcome of trying to buffer one body.
enum Captured {
    Buffered(Bytes),
    /// No exact, bounded length; left unread.
    Streaming(Body),
    /// Reading failed part-way; the bytes are gone.
    Failed,
}

/// Buffer a body of known, bounded size. Anything else passes through
/// as-is.
async fn capture(body: Body) -> Captured {
    let capturable = body
        .size_hint()
        .exact()
        .map_or(false, |len| len <= MAX_CAPTURE_BYTES);
    if !capturable {
        return Captured::Streaming(body);
    }

    match to_bytes(body, usize::MAX).await {
        Ok(bytes) => Captured::Buffered(bytes),
        Err(e) => {
            tracing::warn!(error = %e, "could not buffer body for logging");
            Captured::Failed
        }
    }
}

/// Preview plus the body to hand on. A failed read leaves an empty body,
/// so a declared length no longer holds and is dropped.
fn reassemble(
    headers: &mut HeaderMap,
    captured: Captured,
    preview: impl FnOnce(&[u8]) -> Value,
) -> (Value, Body) {
    match captured {
        Captured::Buffered(bytes) => (preview(&bytes), Body::from(bytes)),
        Captured::Streaming(body) => (Value::String(STREAM_BODY.to_owned()), body),
        Captured::Failed => {
            headers.remove(CONTENT_LENGTH);
            (Value::Null, Body::empty())
        }
    }
}
