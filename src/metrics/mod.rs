pub mod aggregator;
pub mod builder;
pub mod flusher;
pub mod system;

pub use aggregator::{status_class, MetricAggregator, MetricKey, OrderPlaced, Snapshot};
pub use builder::{ExportMetricsRequest, MetricBuilder};
pub use flusher::{FlushReport, Flusher, FlusherHandle};
pub use system::{OsProbe, SystemGauges, SystemProbe};

use serde::Serialize;

/// Cumulative counter or instantaneous gauge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Sum,
    Gauge,
}

/// Numeric payload of a data point; serializes as `asInt` / `asDouble`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum MetricValue {
    #[serde(rename = "asInt")]
    Int(i64),
    #[serde(rename = "asDouble")]
    Double(f64),
}

/// One value produced by the flusher, before timestamps and the
/// `source` attribute are attached by the [`MetricBuilder`].
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    /// e.g. "http.requests_total"
    pub name: &'static str,
    pub unit: &'static str,
    pub kind: MetricKind,
    pub value: MetricValue,
    /// Attribute pairs in emission order.
    pub attributes: Vec<(String, String)>,
}

impl MetricSample {
    pub fn sum(name: &'static str, unit: &'static str, value: i64) -> Self {
        Self {
            name,
            unit,
            kind: MetricKind::Sum,
            value: MetricValue::Int(value),
            attributes: Vec::new(),
        }
    }

    pub fn gauge(name: &'static str, unit: &'static str, value: MetricValue) -> Self {
        Self {
            name,
            unit,
            kind: MetricKind::Gauge,
            value,
            attributes: Vec::new(),
        }
    }

    pub fn attr(mut self, key: &str, value: impl Into<String>) -> Self {
        self.attributes.push((key.to_string(), value.into()));
        self
    }
}
