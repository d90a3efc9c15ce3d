use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use parking_lot::Mutex;
use pizza_telemetry::logs::LogPush;
use pizza_telemetry::metrics::ExportMetricsRequest;
use pizza_telemetry::{server, LogSink, MetricExporter, Result, Telemetry, TelemetryConfig};
use serde_json::Value;
use tower::ServiceExt;

#[derive(Default)]
struct Capture {
    logs: Mutex<Vec<LogPush>>,
    batches: Mutex<Vec<ExportMetricsRequest>>,
}

#[async_trait]
impl LogSink for Capture {
    async fn push(&self, event: LogPush) -> Result<()> {
        self.logs.lock().push(event);
        Ok(())
    }
}

#[async_trait]
impl MetricExporter for Capture {
    async fn export(&self, batch: ExportMetricsRequest) -> Result<()> {
        self.batches.lock().push(batch);
        Ok(())
    }
}

fn setup() -> (Telemetry, Arc<Capture>) {
    let capture = Arc::new(Capture::default());
    let telemetry = Telemetry::new(&TelemetryConfig::default(), capture.clone(), capture.clone());
    (telemetry, capture)
}

async fn wait_for_logs(capture: &Capture, n: usize) {
    for _ in 0..100 {
        if capture.logs.lock().len() >= n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {n} log pushes");
}

#[tokio::test]
async fn health_is_tracked_and_logged() {
    let (telemetry, capture) = setup();
    let app = server::create_router(telemetry.clone());

    let resp = app
        .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&to_bytes(resp.into_body(), usize::MAX).await.unwrap()).unwrap();
    assert_eq!(body["status"], "ok");

    wait_for_logs(&capture, 1).await;
    let log_body: Value = {
        let logs = capture.logs.lock();
        serde_json::from_str(&logs[0].streams[0].values[0][1]).unwrap()
    };
    assert_eq!(log_body["path"], "/api/health");
    assert_eq!(log_body["statusCode"], 200);
    assert_eq!(log_body["resBody"]["status"], "ok");

    telemetry.flush_now().await;
    let batches = capture.batches.lock();
    let json = serde_json::to_value(&batches[0]).unwrap();
    let first = &json["resourceMetrics"][0]["scopeMetrics"][0]["metrics"][0];
    assert_eq!(first["name"], "http.requests_total");
    let attrs = first["sum"]["dataPoints"][0]["attributes"].as_array().unwrap();
    assert!(attrs
        .iter()
        .any(|kv| kv["key"] == "route" && kv["value"]["stringValue"] == "/api/health"));
}

#[tokio::test]
async fn unknown_routes_are_logged_as_warnings() {
    let (telemetry, capture) = setup();
    let app = server::create_router(telemetry);

    let resp = app
        .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    wait_for_logs(&capture, 1).await;
    let logs = capture.logs.lock();
    let labels = serde_json::to_value(&logs[0].streams[0].stream).unwrap();
    assert_eq!(labels["level"], "warn");
    assert_eq!(labels["type"], "http");
}
