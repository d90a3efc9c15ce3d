use std::sync::Arc;

use crate::config::TelemetryConfig;
use crate::export::{backend_or_noop, LogSink, MetricExporter, NoopExporter};
use crate::logs::LogEmitter;
use crate::metrics::{
    FlushReport, Flusher, FlusherHandle, MetricAggregator, MetricBuilder, OrderPlaced, SystemProbe,
};
use crate::middleware::RouteTracker;

/// The whole telemetry subsystem behind one cheaply cloneable handle.
///
/// Business code only sees the recording methods, the request tracker
/// and the log emitter; the tables stay inside the aggregator.
#[derive(Clone)]
pub struct Telemetry {
    metrics: Arc<MetricAggregator>,
    logs: Arc<LogEmitter>,
    flusher: Arc<Flusher>,
}

impl Telemetry {
    /// Build with explicit exporters. Tests pass recording fakes here.
    pub fn new(
        config: &TelemetryConfig,
        metric_exporter: Arc<dyn MetricExporter>,
        log_sink: Arc<dyn LogSink>,
    ) -> Self {
        let metrics = Arc::new(MetricAggregator::new());
        let flusher = Flusher::new(
            metrics.clone(),
            MetricBuilder::new(config.source.clone()),
            metric_exporter,
            config.flush_period,
        );
        Self {
            metrics,
            logs: Arc::new(LogEmitter::new(config.source.clone(), log_sink)),
            flusher: Arc::new(flusher),
        }
    }

    /// HTTP exporters for configured backends, no-ops for the rest, and
    /// no-ops everywhere when the config says offline.
    pub fn from_config(config: &TelemetryConfig) -> Self {
        if config.offline {
            tracing::info!("telemetry offline, outbound pushes disabled");
            let noop = Arc::new(NoopExporter);
            return Self::new(config, noop.clone(), noop);
        }
        let metrics = backend_or_noop(&config.metrics, "metrics");
        let logs = backend_or_noop(&config.logging, "logs");
        Self::new(config, Arc::new(metrics), Arc::new(logs))
    }

    /// Replace the host gauge source. Only valid before the flusher starts.
    pub fn with_probe(self, probe: Arc<dyn SystemProbe>) -> Self {
        let flusher = match Arc::try_unwrap(self.flusher) {
            Ok(flusher) => Arc::new(flusher.with_probe(probe)),
            Err(shared) => {
                tracing::warn!("flusher already shared, system probe not replaced");
                shared
            }
        };
        Self { flusher, ..self }
    }

    pub fn logs(&self) -> &Arc<LogEmitter> {
        &self.logs
    }

    /// State for [`track_request`](crate::middleware::track_request).
    pub fn tracker(&self, route: &str) -> RouteTracker {
        RouteTracker::new(self.metrics.clone(), route)
    }

    /// Tracker that records under the matched axum route.
    pub fn matched_tracker(&self) -> RouteTracker {
        RouteTracker::matched(self.metrics.clone())
    }

    // ── Recording ───────────────────────────────────────────────

    pub fn record_http_request(&self, method: &str, route: &str, status: u16, duration_ms: f64) {
        self.metrics.record_http_request(method, route, status, duration_ms);
    }

    pub fn record_auth_attempt(&self, action: &str, outcome: &str) {
        self.metrics.record_auth_attempt(action, outcome);
    }

    pub fn mark_user_seen<U: ToString + ?Sized>(&self, user_id: &U) {
        self.metrics.mark_user_seen(user_id);
    }

    pub fn record_order_placed(&self, order: OrderPlaced) {
        self.metrics.record_order_placed(order);
    }

    pub fn record_order_failure(&self, kind: &str) {
        self.metrics.record_order_failure(kind);
    }

    pub fn record_factory_latency(&self, duration_ms: f64) {
        self.metrics.record_factory_latency(duration_ms);
    }

    // ── Flushing ────────────────────────────────────────────────

    /// Start the periodic flush loop on the current runtime.
    pub fn start_flusher(&self) -> FlusherHandle {
        tracing::info!(period_ms = self.flusher.period().as_millis() as u64, "metrics flusher started");
        self.flusher.clone().spawn()
    }

    /// One flush cycle right now, e.g. at shutdown.
    pub async fn flush_now(&self) -> FlushReport {
        self.flusher.flush_once().await
    }

    /// Nothing recorded since the last flush.
    pub fn is_window_empty(&self) -> bool {
        self.metrics.is_window_empty()
    }
}
