//! Turns flusher samples into the metrics push body.
//!
//! ```json
//! { "resourceMetrics": [{
//!     "resource": { "attributes": [{ "key": "service.name", "value": { "stringValue": "..." } }] },
//!     "scopeMetrics": [{ "scope": { "name": "custom-metrics", "version": "1.0.0" },
//!                        "metrics": [ ... ] }] }] }
//! ```

use std::sync::atomic::{AtomicI64, Ordering};

use serde::Serialize;

use super::{MetricKind, MetricSample, MetricValue};

pub const SCOPE_NAME: &str = "custom-metrics";
pub const SCOPE_VERSION: &str = "1.0.0";

/// `aggregationTemporality` enum value for cumulative sums.
pub const AGGREGATION_TEMPORALITY_CUMULATIVE: u8 = 2;

// ─── Wire types ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetricsRequest {
    pub resource_metrics: Vec<ResourceMetrics>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMetrics {
    pub resource: Resource,
    pub scope_metrics: Vec<ScopeMetrics>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Resource {
    pub attributes: Vec<KeyValue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScopeMetrics {
    pub scope: Scope,
    pub metrics: Vec<Metric>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Scope {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Metric {
    pub name: String,
    pub unit: String,
    #[serde(flatten)]
    pub data: MetricData,
}

/// Serialized as a `"sum"` or `"gauge"` key on the metric object.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricData {
    Sum(Sum),
    Gauge(Gauge),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sum {
    pub data_points: Vec<NumberDataPoint>,
    pub aggregation_temporality: u8,
    pub is_monotonic: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Gauge {
    pub data_points: Vec<NumberDataPoint>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberDataPoint {
    #[serde(flatten)]
    pub value: MetricValue,
    /// Nanoseconds since the epoch, as a string.
    pub time_unix_nano: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time_unix_nano: Option<String>,
    pub attributes: Vec<KeyValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyValue {
    pub key: String,
    pub value: AnyValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnyValue {
    pub string_value: String,
}

impl KeyValue {
    pub fn string(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: AnyValue {
                string_value: value.into(),
            },
        }
    }
}

impl ExportMetricsRequest {
    /// All metrics in the batch, in emission order.
    pub fn metrics(&self) -> impl Iterator<Item = &Metric> {
        self.resource_metrics
            .iter()
            .flat_map(|r| r.scope_metrics.iter())
            .flat_map(|s| s.metrics.iter())
    }
}

// ─── Builder ─────────────────────────────────────────────────────

/// Encodes samples into [`ExportMetricsRequest`]s.
///
/// Lives as long as the flusher so every cumulative sum carries the same
/// start timestamp across flush cycles.
pub struct MetricBuilder {
    service_name: String,
    source: String,
    process_start_nanos: i64,
    /// Highest timestamp handed out so far.
    last_nanos: AtomicI64,
}

impl MetricBuilder {
    pub fn new(source: impl Into<String>) -> Self {
        Self::with_start(source, now_nanos())
    }

    /// Builder with a fixed process start, in nanoseconds.
    pub fn with_start(source: impl Into<String>, process_start_nanos: i64) -> Self {
        let source = source.into();
        Self {
            service_name: source.clone(),
            source,
            process_start_nanos,
            last_nanos: AtomicI64::new(process_start_nanos),
        }
    }

    pub fn process_start_nanos(&self) -> String {
        self.process_start_nanos.to_string()
    }

    /// Encode a single sample.
    pub fn metric(&self, sample: MetricSample) -> Metric {
        let mut attributes: Vec<KeyValue> = sample
            .attributes
            .into_iter()
            .map(|(k, v)| KeyValue::string(k, v))
            .collect();
        attributes.push(KeyValue::string("source", self.source.clone()));

        let point = NumberDataPoint {
            value: sample.value,
            time_unix_nano: self.next_timestamp().to_string(),
            start_time_unix_nano: match sample.kind {
                MetricKind::Sum => Some(self.process_start_nanos()),
                MetricKind::Gauge => None,
            },
            attributes,
        };

        let data = match sample.kind {
            MetricKind::Sum => MetricData::Sum(Sum {
                data_points: vec![point],
                aggregation_temporality: AGGREGATION_TEMPORALITY_CUMULATIVE,
                is_monotonic: true,
            }),
            MetricKind::Gauge => MetricData::Gauge(Gauge {
                data_points: vec![point],
            }),
        };

        Metric {
            name: sample.name.to_string(),
            unit: sample.unit.to_string(),
            data,
        }
    }

    /// Wrap a whole flush worth of samples in the resource/scope envelope.
    pub fn batch(&self, samples: Vec<MetricSample>) -> ExportMetricsRequest {
        let metrics = samples.into_iter().map(|s| self.metric(s)).collect();
        ExportMetricsRequest {
            resource_metrics: vec![ResourceMetrics {
                resource: Resource {
                    attributes: vec![KeyValue::string("service.name", self.service_name.clone())],
                },
                scope_metrics: vec![ScopeMetrics {
                    scope: Scope {
                        name: SCOPE_NAME.to_string(),
                        version: SCOPE_VERSION.to_string(),
                    },
                    metrics,
                }],
            }],
        }
    }

    /// Wall clock in nanoseconds, never below a previously issued value.
    fn next_timestamp(&self) -> i64 {
        let now = now_nanos();
        let prev = self.last_nanos.fetch_max(now, Ordering::AcqRel);
        prev.max(now)
    }
}

/// Millisecond wall clock scaled to nanoseconds.
fn now_nanos() -> i64 {
    chrono::Utc::now().timestamp_millis().saturating_mul(1_000_000)
}
