use std::collections::{BTreeMap, HashMap};
use std::fmt;

use parking_lot::Mutex;

// ─── Configuration ───────────────────────────────────────────────

/// A user counts as active for this long after their last sighting.
pub const ACTIVE_USER_WINDOW_MS: i64 = 5 * 60 * 1000;

// ─── Public types ────────────────────────────────────────────────

/// Ordered dimension values; equality is exact match on every value.
/// Dimension order is fixed by the recording call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricKey(Vec<String>);

impl MetricKey {
    pub fn new(dims: &[&str]) -> Self {
        Self(dims.iter().map(|d| d.to_string()).collect())
    }

    /// Exactly `n` dimensions, padded with "" when the key is shorter.
    pub fn dims(&self, n: usize) -> Vec<&str> {
        let mut out: Vec<&str> = self.0.iter().take(n).map(String::as_str).collect();
        out.resize(n, "");
        out
    }
}

/// `|`-joined, for diagnostics only.
impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("|"))
    }
}

/// Running sum and count for a per-window average.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LatencySum {
    pub sum_ms: f64,
    pub count: u64,
}

impl LatencySum {
    fn add(&mut self, duration_ms: f64) {
        self.sum_ms += duration_ms;
        self.count += 1;
    }

    /// `None` when nothing was recorded.
    pub fn average(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum_ms / self.count as f64)
    }
}

/// What a business call site reports after a successful order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrderPlaced {
    pub items_count: i64,
    pub revenue_minor_units: i64,
}

/// Everything recorded during one flush window, taken in one step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub taken_at_ms: i64,
    /// (method, route, status class) → request count
    pub http_counts: BTreeMap<MetricKey, u64>,
    /// Same keys as `http_counts`.
    pub http_latency: BTreeMap<MetricKey, LatencySum>,
    /// (action, outcome) → attempts
    pub auth_counts: BTreeMap<MetricKey, u64>,
    pub orders_placed: u64,
    pub items_sold: i64,
    pub revenue_minor_units: i64,
    /// failure kind → count
    pub order_failures: BTreeMap<String, u64>,
    pub factory_latency: LatencySum,
    /// Users seen within the active window at `taken_at_ms`.
    pub active_users: usize,
}

/// Process-wide aggregation tables.
///
/// Recording calls only ever add; [`take_snapshot`](Self::take_snapshot)
/// is the only way to clear anything.
pub struct MetricAggregator {
    inner: Mutex<Inner>,
}

// ─── Internal state ──────────────────────────────────────────────

#[derive(Default)]
struct Inner {
    http_counts: BTreeMap<MetricKey, u64>,
    http_latency: BTreeMap<MetricKey, LatencySum>,
    auth_counts: BTreeMap<MetricKey, u64>,
    orders_placed: u64,
    items_sold: i64,
    revenue_minor_units: i64,
    order_failures: BTreeMap<String, u64>,
    factory_latency: LatencySum,

    // Survives flushes; only pruning removes entries
    last_seen: HashMap<UserKey, i64>,
}

/// Numeric user id normalized to its `f64` bit pattern, so `7`, `"7"`
/// and `7.0` land on the same entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct UserKey(u64);

impl UserKey {
    fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        let id: f64 = trimmed.parse().ok()?;
        if !id.is_finite() {
            return None;
        }
        // -0.0 and 0.0 are the same user
        let id = if id == 0.0 { 0.0 } else { id };
        Some(Self(id.to_bits()))
    }
}

// ─── MetricAggregator impl ───────────────────────────────────────

impl MetricAggregator {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Count one finished request and add its duration to the latency
    /// average for the same (method, route, status class) key.
    pub fn record_http_request(&self, method: &str, route: &str, status: u16, duration_ms: f64) {
        let class = status_class(status);
        let key = MetricKey::new(&[method, route, &class]);
        let duration_ms = finite_or_zero(duration_ms);

        let mut inner = self.inner.lock();
        *inner.http_counts.entry(key.clone()).or_insert(0) += 1;
        inner.http_latency.entry(key).or_default().add(duration_ms);
    }

    /// Free-form action/outcome pair, e.g. ("login", "invalid_credentials").
    pub fn record_auth_attempt(&self, action: &str, outcome: &str) {
        let key = MetricKey::new(&[action, outcome]);
        *self.inner.lock().auth_counts.entry(key).or_insert(0) += 1;
    }

    /// Remember that a user was active now. Ids that are not finite
    /// numbers are ignored.
    pub fn mark_user_seen<U: ToString + ?Sized>(&self, user_id: &U) {
        self.mark_user_seen_at(user_id, now_ms());
    }

    /// [`mark_user_seen`](Self::mark_user_seen) with an explicit clock.
    pub fn mark_user_seen_at<U: ToString + ?Sized>(&self, user_id: &U, at_ms: i64) {
        if let Some(key) = UserKey::parse(&user_id.to_string()) {
            self.inner.lock().last_seen.insert(key, at_ms);
        }
    }

    pub fn record_order_placed(&self, order: OrderPlaced) {
        let mut inner = self.inner.lock();
        inner.orders_placed += 1;
        inner.items_sold = inner.items_sold.saturating_add(order.items_count);
        inner.revenue_minor_units = inner
            .revenue_minor_units
            .saturating_add(order.revenue_minor_units);
    }

    /// An empty kind is recorded as "unknown".
    pub fn record_order_failure(&self, kind: &str) {
        let kind = if kind.trim().is_empty() { "unknown" } else { kind };
        *self
            .inner
            .lock()
            .order_failures
            .entry(kind.to_string())
            .or_insert(0) += 1;
    }

    /// Latency of one call to the upstream pizza factory.
    pub fn record_factory_latency(&self, duration_ms: f64) {
        self.inner
            .lock()
            .factory_latency
            .add(finite_or_zero(duration_ms));
    }

    /// Copy and clear the window, then prune stale users.
    pub fn take_snapshot(&self) -> Snapshot {
        self.take_snapshot_at(now_ms())
    }

    /// [`take_snapshot`](Self::take_snapshot) with an explicit clock.
    ///
    /// Copy, clear and prune all happen under one lock acquisition, so a
    /// concurrent recording call lands either entirely in this snapshot
    /// or entirely in the next window.
    pub fn take_snapshot_at(&self, now_ms: i64) -> Snapshot {
        let mut inner = self.inner.lock();

        let cutoff = now_ms - ACTIVE_USER_WINDOW_MS;
        inner.last_seen.retain(|_, seen| *seen > cutoff);

        Snapshot {
            taken_at_ms: now_ms,
            http_counts: std::mem::take(&mut inner.http_counts),
            http_latency: std::mem::take(&mut inner.http_latency),
            auth_counts: std::mem::take(&mut inner.auth_counts),
            orders_placed: std::mem::take(&mut inner.orders_placed),
            items_sold: std::mem::take(&mut inner.items_sold),
            revenue_minor_units: std::mem::take(&mut inner.revenue_minor_units),
            order_failures: std::mem::take(&mut inner.order_failures),
            factory_latency: std::mem::take(&mut inner.factory_latency),
            active_users: inner.last_seen.len(),
        }
    }

    /// True when nothing has been recorded since the last snapshot.
    /// The active-user set is not part of the window.
    pub fn is_window_empty(&self) -> bool {
        let inner = self.inner.lock();
        inner.http_counts.is_empty()
            && inner.http_latency.is_empty()
            && inner.auth_counts.is_empty()
            && inner.orders_placed == 0
            && inner.items_sold == 0
            && inner.revenue_minor_units == 0
            && inner.order_failures.is_empty()
            && inner.factory_latency.count == 0
    }
}

impl Default for MetricAggregator {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Helpers ─────────────────────────────────────────────────────

/// 404 → "4xx", 200 → "2xx". Zero and sub-100 codes land in "0xx".
pub fn status_class(code: u16) -> String {
    format!("{}xx", code / 100)
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn status_classes() {
        assert_eq!(status_class(404), "4xx");
        assert_eq!(status_class(200), "2xx");
        assert_eq!(status_class(503), "5xx");
        assert_eq!(status_class(0), "0xx");
        assert_eq!(status_class(99), "0xx");
    }

    #[test]
    fn metric_key_round_trips_dimensions() {
        let key = MetricKey::new(&["GET", "/api/order", "2xx"]);
        assert_eq!(key.to_string(), "GET|/api/order|2xx");
        assert_eq!(key.dims(3), vec!["GET", "/api/order", "2xx"]);
        assert_eq!(MetricKey::new(&["login"]).dims(2), vec!["login", ""]);
    }

    #[test]
    fn separator_inside_a_dimension_keeps_keys_apart() {
        let agg = MetricAggregator::new();
        agg.record_auth_attempt("a|b", "c");
        agg.record_auth_attempt("a", "b|c");

        let snap = agg.take_snapshot_at(0);
        assert_eq!(snap.auth_counts.len(), 2);
        let left = MetricKey::new(&["a|b", "c"]);
        assert_eq!(snap.auth_counts[&left], 1);
        assert_eq!(left.dims(2), vec!["a|b", "c"]);
        assert_eq!(MetricKey::new(&["a", "b|c"]).dims(2), vec!["a", "b|c"]);
    }

    #[test]
    fn http_counts_and_latency_share_a_key() {
        let agg = MetricAggregator::new();
        agg.record_http_request("GET", "/api/order/menu", 200, 10.0);
        agg.record_http_request("GET", "/api/order/menu", 201, 30.0);
        agg.record_http_request("GET", "/api/order/menu", 404, 5.0);

        let snap = agg.take_snapshot_at(0);
        let ok = MetricKey::new(&["GET", "/api/order/menu", "2xx"]);
        let missing = MetricKey::new(&["GET", "/api/order/menu", "4xx"]);
        assert_eq!(snap.http_counts[&ok], 2);
        assert_eq!(snap.http_counts[&missing], 1);
        assert_eq!(snap.http_latency[&ok].average(), Some(20.0));
    }

    #[test]
    fn invalid_durations_degrade_to_zero() {
        let agg = MetricAggregator::new();
        agg.record_http_request("PUT", "/api/auth", 200, f64::NAN);
        agg.record_factory_latency(f64::INFINITY);
        agg.record_factory_latency(12.0);

        let snap = agg.take_snapshot_at(0);
        let key = MetricKey::new(&["PUT", "/api/auth", "2xx"]);
        assert_eq!(snap.http_latency[&key].sum_ms, 0.0);
        assert_eq!(snap.factory_latency.count, 2);
        assert_eq!(snap.factory_latency.average(), Some(6.0));
    }

    #[test]
    fn auth_attempts_accept_anything() {
        let agg = MetricAggregator::new();
        agg.record_auth_attempt("login", "success");
        agg.record_auth_attempt("login", "success");
        agg.record_auth_attempt("teleport", "???");

        let snap = agg.take_snapshot_at(0);
        assert_eq!(snap.auth_counts[&MetricKey::new(&["login", "success"])], 2);
        assert_eq!(snap.auth_counts[&MetricKey::new(&["teleport", "???"])], 1);
    }

    #[test]
    fn orders_accumulate_and_reset() {
        let agg = MetricAggregator::new();
        let order = OrderPlaced {
            items_count: 2,
            revenue_minor_units: 850,
        };
        agg.record_order_placed(order);
        agg.record_order_placed(order);

        let snap = agg.take_snapshot_at(0);
        assert_eq!(snap.orders_placed, 2);
        assert_eq!(snap.items_sold, 4);
        assert_eq!(snap.revenue_minor_units, 1700);
        assert!(agg.is_window_empty());

        let next = agg.take_snapshot_at(1);
        assert_eq!(next.orders_placed, 0);
        assert_eq!(next.revenue_minor_units, 0);
    }

    #[test]
    fn empty_failure_kind_is_unknown() {
        let agg = MetricAggregator::new();
        agg.record_order_failure("");
        agg.record_order_failure("factory_error");
        agg.record_order_failure("  ");

        let snap = agg.take_snapshot_at(0);
        assert_eq!(snap.order_failures["unknown"], 2);
        assert_eq!(snap.order_failures["factory_error"], 1);
    }

    #[test]
    fn active_users_window() {
        let agg = MetricAggregator::new();
        let t = 1_000_000;
        agg.mark_user_seen_at(&1, t);
        agg.mark_user_seen_at("2", t - ACTIVE_USER_WINDOW_MS + 1);
        agg.mark_user_seen_at(&3, t - ACTIVE_USER_WINDOW_MS);

        // user 3 is exactly five minutes old and drops out
        assert_eq!(agg.take_snapshot_at(t).active_users, 2);
        // one millisecond later user 2 follows
        assert_eq!(agg.take_snapshot_at(t + 1).active_users, 1);
    }

    #[test]
    fn seeing_a_user_again_overwrites() {
        let agg = MetricAggregator::new();
        agg.mark_user_seen_at(&7, 0);
        agg.mark_user_seen_at("7", ACTIVE_USER_WINDOW_MS);
        agg.mark_user_seen_at(&7.0, ACTIVE_USER_WINDOW_MS);

        let snap = agg.take_snapshot_at(ACTIVE_USER_WINDOW_MS + 10);
        assert_eq!(snap.active_users, 1);
    }

    #[test]
    fn non_numeric_user_ids_are_ignored() {
        let agg = MetricAggregator::new();
        agg.mark_user_seen_at("abc", 0);
        agg.mark_user_seen_at("", 0);
        agg.mark_user_seen_at("NaN", 0);
        agg.mark_user_seen_at(&f64::INFINITY, 0);
        assert_eq!(agg.take_snapshot_at(0).active_users, 0);
    }

    #[test]
    fn concurrent_recording_is_never_lost_or_double_counted() {
        let agg = Arc::new(MetricAggregator::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let agg = agg.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..1_000 {
                    agg.record_auth_attempt("login", "success");
                }
            }));
        }

        let mut seen = 0;
        while handles.iter().any(|h| !h.is_finished()) {
            let snap = agg.take_snapshot_at(0);
            seen += snap.auth_counts.values().sum::<u64>();
        }
        for h in handles {
            h.join().unwrap();
        }
        seen += agg.take_snapshot_at(0).auth_counts.values().sum::<u64>();

        assert_eq!(seen, 8_000);
    }
}
