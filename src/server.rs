use axum::{
    http::StatusCode,
    middleware::{self as axum_mw},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;

use crate::middleware::{log_http, track_request};
use crate::Telemetry;

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
}

/// Builds the host router: every route is tracked and every response
/// goes through the HTTP logger.
pub fn create_router(telemetry: Telemetry) -> Router {
    Router::new()
        // ── Health ──────────────────────────────────────────────
        .route(
            "/api/health",
            get(health).route_layer(axum_mw::from_fn_with_state(
                telemetry.tracker("/api/health"),
                track_request,
            )),
        )
        .fallback(not_found)
        // ── Global middleware (applied bottom-up) ───────────────
        .layer(axum_mw::from_fn_with_state(telemetry.logs().clone(), log_http))
        .layer(CorsLayer::permissive())
}

async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "message": "unknown endpoint" })),
    )
}
