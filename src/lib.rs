//! In-process telemetry for the pizza service.
//!
//! Business code records through [`Telemetry`]; a background flusher
//! drains the aggregation window on a fixed period and pushes one metric
//! batch, while every request (and every explicit log call) produces one
//! redacted log record pushed in the background. Nothing in here can
//! fail a request.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod export;
pub mod logs;
pub mod metrics;
pub mod middleware;
pub mod redact;
pub mod server;
pub mod telemetry;

pub use config::{BackendConfig, TelemetryConfig};
pub use error::{Result, TelemetryError};
pub use export::{BackendClient, LogSink, MetricExporter, NoopExporter};
pub use logs::LogEmitter;
pub use metrics::{FlushReport, FlusherHandle, OrderPlaced};
pub use telemetry::Telemetry;
