use pizza_telemetry::{diagnostics, server, Telemetry, TelemetryConfig};

#[tokio::main]
async fn main() {
    // ── 1. Configuration + local diagnostics ─────────────────────
    let config = TelemetryConfig::from_env();
    if let Err(e) = diagnostics::init_logging(config.log_format, &config.log_level) {
        eprintln!("diagnostics disabled: {e}");
    }

    // ── 2. Telemetry state ───────────────────────────────────────
    let telemetry = Telemetry::from_config(&config);
    diagnostics::install_panic_hook(telemetry.logs().clone());
    let flusher = telemetry.start_flusher();

    // ── 3. Router ────────────────────────────────────────────────
    let app = server::create_router(telemetry.clone());

    // ── 4. Bind & serve ──────────────────────────────────────────
    let listener = match tokio::net::TcpListener::bind(&config.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %config.bind_addr, error = %e, "failed to bind");
            std::process::exit(1);
        }
    };
    tracing::info!(addr = %config.bind_addr, source = %config.source, "server listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "server exited with error");
        if let Err(push_err) = telemetry.logs().unhandled_error_now(&e).await {
            tracing::warn!(error = %push_err, "failed to send unhandled error record");
        }
    }

    // ── 5. Stop the loop, push what is left ──────────────────────
    flusher.stop().await;
    let report = telemetry.flush_now().await;
    tracing::info!(points = report.points, exported = report.exported, "final flush");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for ctrl-c");
    }
    tracing::info!("shutdown requested");
}
