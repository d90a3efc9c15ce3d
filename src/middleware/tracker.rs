use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};

use crate::metrics::MetricAggregator;

/// State for [`track_request`]: where to record, and under which route
/// template.
#[derive(Clone)]
pub struct RouteTracker {
    metrics: Arc<MetricAggregator>,
    route: Option<Arc<str>>,
}

impl RouteTracker {
    /// Record under a fixed route template such as `/api/user/:userId`.
    pub fn new(metrics: Arc<MetricAggregator>, route: &str) -> Self {
        Self {
            metrics,
            route: Some(Arc::from(route)),
        }
    }

    /// Record under whatever route axum matched.
    pub fn matched(metrics: Arc<MetricAggregator>) -> Self {
        Self {
            metrics,
            route: None,
        }
    }
}

/// Times the request and counts it under (method, route, status class).
///
/// ```ignore
/// .route("/api/order", post(create_order).route_layer(
///     axum::middleware::from_fn_with_state(telemetry.tracker("/api/order"), track_request),
/// ))
/// ```
pub async fn track_request(
    State(tracker): State<RouteTracker>,
    req: Request,
    next: Next,
) -> Response {
    let method = req.method().as_str().to_owned();
    let route = resolve_route(&tracker, &req);

    let start = Instant::now();
    let response = next.run(req).await;
    let elapsed = start.elapsed();

    let status = response.status().as_u16();
    let ms = elapsed.as_secs_f64() * 1000.0;
    tracker.metrics.record_http_request(&method, &route, status, ms);

    tracing::debug!(status, method = %method, route = %route, us = elapsed.as_micros() as u64, "request tracked");

    response
}

/// Template, then matched path, then raw path, then "unknown".
fn resolve_route(tracker: &RouteTracker, req: &Request) -> String {
    if let Some(route) = &tracker.route {
        if !route.is_empty() {
            return route.to_string();
        }
    }
    if let Some(matched) = req.extensions().get::<MatchedPath>() {
        return matched.as_str().to_owned();
    }
    let path = req.uri().path();
    if path.is_empty() {
        "unknown".to_owned()
    } else {
        path.to_owned()
    }
}
