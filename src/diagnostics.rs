//! Local diagnostic channel: the process's own `tracing` output, where
//! telemetry failures are reported instead of reaching request handlers.

use std::any::Any;
use std::sync::Arc;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogFormat;
use crate::error::{Result, TelemetryError};
use crate::logs::LogEmitter;

/// Install the global subscriber. Call once at startup.
pub fn init_logging(format: LogFormat, level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .map_err(|e| TelemetryError::Diagnostics(format!("invalid filter '{level}': {e}")))?;
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
    }
    .map_err(|_| TelemetryError::Diagnostics("subscriber already initialized".to_string()))
}

/// Forward panics to the log backend as `unhandledError` records, then
/// run the previous hook.
pub fn install_panic_hook(logs: Arc<LogEmitter>) {
    let prev_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let message = panic_message(info.payload());
        let location = info.location().map(|l| l.to_string());
        tracing::error!(panic.payload = message, panic.location = location.as_deref(), "panic");
        logs.unhandled_panic(message, location);
        prev_hook(info);
    }));
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic payload"
    }
}
