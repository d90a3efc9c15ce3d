//! Outbound pushes to the observability backend.
//!
//! The flusher and the log emitter only see the [`MetricExporter`] and
//! [`LogSink`] traits; which implementation sits behind them is decided
//! once, when the [`Telemetry`](crate::Telemetry) object is built.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::Serialize;

use crate::config::BackendConfig;
use crate::error::{Result, TelemetryError};
use crate::logs::LogPush;
use crate::metrics::ExportMetricsRequest;

const PUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Receives one encoded metric batch per flush window.
#[async_trait]
pub trait MetricExporter: Send + Sync {
    async fn export(&self, batch: ExportMetricsRequest) -> Result<()>;
}

/// Receives one log push per emitted record.
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn push(&self, event: LogPush) -> Result<()>;
}

/// Swallows everything. Used when a backend is unconfigured or the
/// process runs offline.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopExporter;

#[async_trait]
impl MetricExporter for NoopExporter {
    async fn export(&self, _batch: ExportMetricsRequest) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl LogSink for NoopExporter {
    async fn push(&self, _event: LogPush) -> Result<()> {
        Ok(())
    }
}

/// JSON-over-HTTP push with a `Bearer <id>:<key>` credential.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    url: String,
    bearer: String,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(PUSH_TIMEOUT).build()?;
        Ok(Self {
            http,
            url: config.url.clone(),
            bearer: config.bearer(),
        })
    }

    async fn post<T: Serialize + ?Sized>(&self, payload: &T) -> Result<()> {
        let response = self
            .http
            .post(&self.url)
            .header(AUTHORIZATION, &self.bearer)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TelemetryError::Status {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MetricExporter for BackendClient {
    async fn export(&self, batch: ExportMetricsRequest) -> Result<()> {
        self.post(&batch).await
    }
}

#[async_trait]
impl LogSink for BackendClient {
    async fn push(&self, event: LogPush) -> Result<()> {
        self.post(&event).await
    }
}

/// HTTP client when the backend is fully configured, otherwise a no-op.
///
/// A client that fails to build degrades to the no-op as well, so a bad
/// TLS setup never stops the service from starting.
pub fn backend_or_noop(config: &BackendConfig, kind: &str) -> BackendChoice {
    if !config.is_complete() {
        tracing::debug!(backend = kind, "backend not configured, pushes disabled");
        return BackendChoice::Noop(NoopExporter);
    }
    match BackendClient::new(config) {
        Ok(client) => BackendChoice::Http(client),
        Err(e) => {
            tracing::error!(backend = kind, error = %e, "cannot build push client, pushes disabled");
            BackendChoice::Noop(NoopExporter)
        }
    }
}

/// Outcome of [`backend_or_noop`].
#[derive(Debug, Clone)]
pub enum BackendChoice {
    Http(BackendClient),
    Noop(NoopExporter),
}

impl BackendChoice {
    pub fn is_noop(&self) -> bool {
        matches!(self, Self::Noop(_))
    }
}

#[async_trait]
impl MetricExporter for BackendChoice {
    async fn export(&self, batch: ExportMetricsRequest) -> Result<()> {
        match self {
            Self::Http(client) => client.export(batch).await,
            Self::Noop(noop) => noop.export(batch).await,
        }
    }
}

#[async_trait]
impl LogSink for BackendChoice {
    async fn push(&self, event: LogPush) -> Result<()> {
        match self {
            Self::Http(client) => client.push(event).await,
            Self::Noop(noop) => noop.push(event).await,
        }
    }
}
