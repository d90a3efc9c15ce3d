use std::error::Error as StdError;
use std::future::Future;
use std::sync::Arc;

use serde::Serialize;

use super::record::{EventType, HttpLogData, Labels, LogLevel, LogPush};
use crate::error::Result;
use crate::export::LogSink;
use crate::redact::sanitize;

/// Builds one sanitized record per event and pushes it without making
/// the caller wait.
pub struct LogEmitter {
    component: String,
    sink: Arc<dyn LogSink>,
}

#[derive(Serialize)]
struct DbLog<'a, P: Serialize + ?Sized> {
    sql: &'a str,
    params: &'a P,
}

#[derive(Serialize)]
struct ErrorLog {
    name: String,
    message: String,
    stack: String,
}

impl LogEmitter {
    pub fn new(component: impl Into<String>, sink: Arc<dyn LogSink>) -> Self {
        Self {
            component: component.into(),
            sink,
        }
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    /// Severity follows the status code.
    pub fn http(&self, data: HttpLogData) {
        self.log(LogLevel::from_status(data.status_code), EventType::Http, &data);
    }

    /// One executed SQL statement with its bound parameters.
    pub fn db<P: Serialize + ?Sized>(&self, sql: &str, params: &P) {
        self.log(LogLevel::Info, EventType::Db, &DbLog { sql, params });
    }

    /// Request/response exchanged with the upstream pizza factory.
    pub fn factory<T: Serialize + ?Sized>(&self, info: &T) {
        self.log(LogLevel::Info, EventType::Factory, info);
    }

    /// An error nobody handled. `stack` is the `source()` chain.
    pub fn unhandled_error<E: StdError + ?Sized>(&self, err: &E) {
        self.log(LogLevel::Error, EventType::UnhandledError, &ErrorLog::from_error(err));
    }

    /// Like [`unhandled_error`](Self::unhandled_error), but the push is
    /// returned instead of spawned. Await it when the runtime is about to
    /// shut down.
    pub fn unhandled_error_now<E: StdError + ?Sized>(
        &self,
        err: &E,
    ) -> impl Future<Output = Result<()>> + Send + 'static {
        self.log_now(LogLevel::Error, EventType::UnhandledError, &ErrorLog::from_error(err))
    }

    /// A panic caught by the process hook.
    pub fn unhandled_panic(&self, message: &str, location: Option<String>) {
        let data = ErrorLog {
            name: "panic".to_string(),
            message: message.to_string(),
            stack: location.unwrap_or_default(),
        };
        self.log(LogLevel::Error, EventType::UnhandledError, &data);
    }

    /// Redact, encode and push in the background.
    pub fn log<T: Serialize + ?Sized>(&self, level: LogLevel, event_type: EventType, data: &T) {
        let push = self.build_push(level, event_type, data);
        self.dispatch(push);
    }

    /// Redact and encode now; the returned future performs the push.
    pub fn log_now<T: Serialize + ?Sized>(
        &self,
        level: LogLevel,
        event_type: EventType,
        data: &T,
    ) -> impl Future<Output = Result<()>> + Send + 'static {
        self.send(self.build_push(level, event_type, data))
    }

    /// The push that [`log`](Self::log) would send.
    pub fn build_push<T: Serialize + ?Sized>(
        &self,
        level: LogLevel,
        event_type: EventType,
        data: &T,
    ) -> LogPush {
        let labels = Labels {
            component: self.component.clone(),
            level,
            event_type,
        };
        LogPush::single(labels, now_nanos_string(), sanitize(data))
    }

    fn send(&self, push: LogPush) -> impl Future<Output = Result<()>> + Send + 'static {
        let sink = self.sink.clone();
        async move { sink.push(push).await }
    }

    fn dispatch(&self, push: LogPush) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::debug!("no async runtime, log record dropped");
                return;
            }
        };
        let send = self.send(push);
        handle.spawn(async move {
            if let Err(e) = send.await {
                tracing::warn!(error = %e, "failed to send log record");
            }
        });
    }
}

impl ErrorLog {
    fn from_error<E: StdError + ?Sized>(err: &E) -> Self {
        Self {
            name: short_type_name::<E>().to_string(),
            message: err.to_string(),
            stack: source_chain(err),
        }
    }
}

fn now_nanos_string() -> String {
    (chrono::Utc::now().timestamp_millis() as i128 * 1_000_000).to_string()
}

fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

fn source_chain<E: StdError + ?Sized>(err: &E) -> String {
    let mut lines = vec![err.to_string()];
    let mut current = err.source();
    while let Some(cause) = current {
        lines.push(format!("caused by: {cause}"));
        current = cause.source();
    }
    lines.join("\n")
}
