use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::aggregator::{MetricAggregator, Snapshot};
use super::builder::MetricBuilder;
use super::system::{OsProbe, SystemGauges, SystemProbe};
use super::{MetricSample, MetricValue};
use crate::config::clamp_flush_period;
use crate::export::MetricExporter;

/// Outcome of one flush cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    /// Metric points in the batch.
    pub points: usize,
    /// Whether the exporter accepted the batch.
    pub exported: bool,
}

/// Periodically drains the aggregator and pushes one metric batch.
pub struct Flusher {
    metrics: Arc<MetricAggregator>,
    builder: MetricBuilder,
    exporter: Arc<dyn MetricExporter>,
    probe: Arc<dyn SystemProbe>,
    period: Duration,
}

/// Running flush loop. Dropping the handle leaves the loop running;
/// call [`stop`](Self::stop) to end it.
pub struct FlusherHandle {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl Flusher {
    pub fn new(
        metrics: Arc<MetricAggregator>,
        builder: MetricBuilder,
        exporter: Arc<dyn MetricExporter>,
        period: Duration,
    ) -> Self {
        let period_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX);
        Self {
            metrics,
            builder,
            exporter,
            probe: Arc::new(OsProbe),
            period: clamp_flush_period(period_ms),
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn SystemProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Snapshot-and-clear, then build the samples for that window.
    /// Nothing here awaits.
    pub fn collect(&self) -> Vec<MetricSample> {
        let snapshot = self.metrics.take_snapshot();
        samples_from_snapshot(&snapshot, self.probe.sample())
    }

    /// Run one full cycle. Export failures are logged and the batch is
    /// dropped; they never reach the caller.
    pub async fn flush_once(&self) -> FlushReport {
        tracing::debug!("flushing metrics");
        let samples = self.collect();
        let points = samples.len();
        let batch = self.builder.batch(samples);

        // The live tables are already clear; new events go to the next window.
        let exported = match self.exporter.export(batch).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, points, "metrics push failed, batch dropped");
                false
            }
        };
        FlushReport { points, exported }
    }

    /// Start the periodic loop on the current runtime. The first flush
    /// happens one period after start.
    pub fn spawn(self: Arc<Self>) -> FlusherHandle {
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval fires immediately on the first tick
            interval.tick().await;

            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => {
                        tracing::info!("metrics flusher: shutdown signal received");
                        break;
                    }
                    _ = interval.tick() => {
                        let report = self.flush_once().await;
                        tracing::debug!(points = report.points, exported = report.exported, "flush finished");
                    }
                }
            }
        });

        FlusherHandle { shutdown, task }
    }
}

impl FlusherHandle {
    /// Cancel the loop and wait for it to exit.
    pub async fn stop(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "metrics flusher task failed");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// One sample per emitted metric, in a stable order.
pub fn samples_from_snapshot(snap: &Snapshot, system: SystemGauges) -> Vec<MetricSample> {
    let mut out = Vec::new();

    // ── HTTP counters + average latency ─────────────────────────
    for (key, &count) in &snap.http_counts {
        let dims = key.dims(3);
        let (method, route, class) = (dims[0], dims[1], dims[2]);
        out.push(
            MetricSample::sum("http.requests_total", "", saturating_i64(count))
                .attr("method", method)
                .attr("route", route)
                .attr("status_class", class),
        );
        if let Some(avg) = snap.http_latency.get(key).and_then(|l| l.average()) {
            out.push(
                MetricSample::gauge("http.request_duration_avg_ms", "ms", MetricValue::Double(avg))
                    .attr("method", method)
                    .attr("route", route)
                    .attr("status_class", class),
            );
        }
    }

    // ── Auth attempts ───────────────────────────────────────────
    for (key, &count) in &snap.auth_counts {
        let dims = key.dims(2);
        out.push(
            MetricSample::sum("auth.attempts_total", "", saturating_i64(count))
                .attr("action", dims[0])
                .attr("outcome", dims[1]),
        );
    }

    // ── Orders ──────────────────────────────────────────────────
    if snap.orders_placed != 0 {
        out.push(MetricSample::sum(
            "orders.placed_total",
            "",
            saturating_i64(snap.orders_placed),
        ));
    }
    if snap.items_sold != 0 {
        out.push(MetricSample::sum("pizza.items_sold_total", "", snap.items_sold));
    }
    if snap.revenue_minor_units != 0 {
        out.push(
            MetricSample::sum("revenue.total_minor_units", "minor_unit", snap.revenue_minor_units)
                .attr("currency", "USD"),
        );
    }
    for (kind, &count) in &snap.order_failures {
        out.push(
            MetricSample::sum("order.create_total", "", saturating_i64(count))
                .attr("outcome", kind.as_str()),
        );
    }
    if let Some(avg) = snap.factory_latency.average() {
        out.push(MetricSample::gauge(
            "order.factory_latency_avg_ms",
            "ms",
            MetricValue::Double(avg),
        ));
    }

    // ── Users + system, always present ──────────────────────────
    out.push(
        MetricSample::gauge(
            "users.active_gauge",
            "users",
            MetricValue::Int(saturating_i64(snap.active_users as u64)),
        )
        .attr("window", "5m"),
    );
    out.push(MetricSample::gauge(
        "system.normalized_load1m",
        "",
        MetricValue::Double(system.load1m_normalized),
    ));
    out.push(MetricSample::gauge(
        "system.memory_used_percent",
        "%",
        MetricValue::Double(system.memory_used_percent),
    ));

    out
}

fn saturating_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, TelemetryError};
    use crate::metrics::{ExportMetricsRequest, MetricKind, OrderPlaced};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct FixedProbe;

    impl SystemProbe for FixedProbe {
        fn sample(&self) -> SystemGauges {
            SystemGauges {
                load1m_normalized: 0.25,
                memory_used_percent: 50.0,
            }
        }
    }

    #[derive(Default)]
    struct RecordingExporter {
        batches: Mutex<Vec<ExportMetricsRequest>>,
        fail: bool,
    }

    #[async_trait]
    impl MetricExporter for RecordingExporter {
        async fn export(&self, batch: ExportMetricsRequest) -> Result<()> {
            if self.fail {
                return Err(TelemetryError::Status { status: 503 });
            }
            self.batches.lock().push(batch);
            Ok(())
        }
    }

    fn flusher(exporter: Arc<RecordingExporter>) -> (Arc<MetricAggregator>, Flusher) {
        let metrics = Arc::new(MetricAggregator::new());
        let flusher = Flusher::new(
            metrics.clone(),
            MetricBuilder::new("pizza-test"),
            exporter,
            Duration::from_millis(1_000),
        )
        .with_probe(Arc::new(FixedProbe));
        (metrics, flusher)
    }

    fn find<'a>(samples: &'a [MetricSample], name: &str) -> Vec<&'a MetricSample> {
        samples.iter().filter(|s| s.name == name).collect()
    }

    #[test]
    fn empty_window_emits_only_always_on_gauges() {
        let samples = samples_from_snapshot(&Snapshot::default(), SystemGauges::default());
        let names: Vec<_> = samples.iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec![
                "users.active_gauge",
                "system.normalized_load1m",
                "system.memory_used_percent"
            ]
        );
        assert!(samples.iter().all(|s| s.kind == MetricKind::Gauge));
    }

    #[test]
    fn order_scenario() {
        let (metrics, flusher) = flusher(Arc::default());
        let order = OrderPlaced {
            items_count: 2,
            revenue_minor_units: 850,
        };
        metrics.record_order_placed(order);
        metrics.record_order_placed(order);

        let samples = flusher.collect();
        assert_eq!(find(&samples, "orders.placed_total")[0].value, MetricValue::Int(2));
        assert_eq!(find(&samples, "pizza.items_sold_total")[0].value, MetricValue::Int(4));
        let revenue = find(&samples, "revenue.total_minor_units")[0];
        assert_eq!(revenue.value, MetricValue::Int(1700));
        assert_eq!(revenue.unit, "minor_unit");
        assert_eq!(revenue.attributes, vec![("currency".to_string(), "USD".to_string())]);
        assert!(metrics.is_window_empty());
    }

    #[test]
    fn http_keys_emit_counter_and_average() {
        let (metrics, flusher) = flusher(Arc::default());
        metrics.record_http_request("POST", "/api/order", 200, 40.0);
        metrics.record_http_request("POST", "/api/order", 200, 60.0);
        metrics.record_http_request("POST", "/api/order", 500, 7.0);

        let samples = flusher.collect();
        let counts = find(&samples, "http.requests_total");
        assert_eq!(counts.len(), 2);
        assert_eq!(counts[0].value, MetricValue::Int(2));
        assert_eq!(
            counts[0].attributes,
            vec![
                ("method".to_string(), "POST".to_string()),
                ("route".to_string(), "/api/order".to_string()),
                ("status_class".to_string(), "2xx".to_string()),
            ]
        );
        let avgs = find(&samples, "http.request_duration_avg_ms");
        assert_eq!(avgs[0].value, MetricValue::Double(50.0));
        assert_eq!(avgs[1].value, MetricValue::Double(7.0));
    }

    #[test]
    fn failures_factory_latency_and_gauges() {
        let (metrics, flusher) = flusher(Arc::default());
        metrics.record_order_failure("factory_error");
        metrics.record_order_failure("");
        metrics.record_factory_latency(100.0);
        metrics.record_factory_latency(300.0);
        metrics.mark_user_seen(&12);

        let samples = flusher.collect();
        let failures = find(&samples, "order.create_total");
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].attributes[0].1, "factory_error");
        assert_eq!(failures[1].attributes[0].1, "unknown");
        assert_eq!(
            find(&samples, "order.factory_latency_avg_ms")[0].value,
            MetricValue::Double(200.0)
        );
        assert_eq!(find(&samples, "users.active_gauge")[0].value, MetricValue::Int(1));
        assert_eq!(
            find(&samples, "system.memory_used_percent")[0].value,
            MetricValue::Double(50.0)
        );
    }

    #[tokio::test]
    async fn flush_exports_exact_sums_and_clears() {
        let exporter = Arc::new(RecordingExporter::default());
        let (metrics, flusher) = flusher(exporter.clone());
        for _ in 0..5 {
            metrics.record_auth_attempt("login", "success");
        }

        let report = flusher.flush_once().await;
        assert!(report.exported);
        assert!(metrics.is_window_empty());

        let batches = exporter.batches.lock();
        assert_eq!(batches.len(), 1);
        let auth = batches[0]
            .metrics()
            .find(|m| m.name == "auth.attempts_total")
            .cloned()
            .unwrap();
        let v = serde_json::to_value(&auth).unwrap();
        assert_eq!(v["sum"]["dataPoints"][0]["asInt"], 5);
    }

    #[tokio::test]
    async fn failed_export_drops_batch_and_next_window_is_clean() {
        let exporter = Arc::new(RecordingExporter {
            fail: true,
            ..Default::default()
        });
        let (metrics, flusher) = flusher(exporter);
        metrics.record_order_placed(OrderPlaced {
            items_count: 1,
            revenue_minor_units: 100,
        });

        let report = flusher.flush_once().await;
        assert!(!report.exported);
        assert!(metrics.is_window_empty());

        metrics.record_order_placed(OrderPlaced {
            items_count: 3,
            revenue_minor_units: 10,
        });
        let samples = flusher.collect();
        assert_eq!(find(&samples, "orders.placed_total")[0].value, MetricValue::Int(1));
        assert_eq!(find(&samples, "pizza.items_sold_total")[0].value, MetricValue::Int(3));
    }

    #[test]
    fn period_is_clamped() {
        let flusher = Flusher::new(
            Arc::new(MetricAggregator::new()),
            MetricBuilder::new("pizza"),
            Arc::new(RecordingExporter::default()),
            Duration::from_millis(5),
        );
        assert_eq!(flusher.period(), Duration::from_millis(1_000));
    }

    #[tokio::test(start_paused = true)]
    async fn loop_flushes_each_period_until_stopped() {
        let exporter = Arc::new(RecordingExporter::default());
        let (_metrics, flusher) = flusher(exporter.clone());
        let handle = Arc::new(flusher).spawn();

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(exporter.batches.lock().len(), 2);

        handle.stop().await;
        tokio::time::sleep(Duration::from_millis(5_000)).await;
        assert_eq!(exporter.batches.lock().len(), 2);
    }
}
