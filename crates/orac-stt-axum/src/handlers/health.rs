//! Service-level health endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use crate::state::AppState;

#[derive(Serialize)]
struct HealthChecks {
    api: &'static str,
    whisper_server: &'static str,
    restart_count: u32,
    consecutive_failures: u32,
    watchdog: &'static str,
}

#[derive(Serialize)]
struct HealthStatus {
    status: &'static str,
    timestamp: DateTime<Utc>,
    version: &'static str,
    checks: HealthChecks,
}

/// `GET /health` — aggregate health with a live engine probe.
pub async fn aggregate(State(state): State<AppState>) -> Json<serde_json::Value> {
    let engine_healthy = state.supervisor.probe_health().await;
    let engine = state.supervisor.status();

    let mut overall = "healthy";
    if !engine_healthy {
        overall = "degraded";
    }
    if engine.consecutive_failures >= state.supervisor.max_consecutive_failures() {
        overall = "unhealthy";
    }

    let status = HealthStatus {
        status: overall,
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION"),
        checks: HealthChecks {
            api: "healthy",
            whisper_server: if engine_healthy { "healthy" } else { "unhealthy" },
            restart_count: engine.restart_count,
            consecutive_failures: engine.consecutive_failures,
            watchdog: if engine.watchdog_running {
                "running"
            } else {
                "stopped"
            },
        },
    };
    Json(serde_json::to_value(status).unwrap_or_else(|_| json!({"status": "unhealthy"})))
}

/// `GET /health/live` — always 200 while the process runs.
pub async fn live() -> Json<serde_json::Value> {
    Json(json!({"status": "alive"}))
}

/// `GET /health/ready` — 200 once the engine reached Ready at least once.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    if state.supervisor.ever_ready() {
        (StatusCode::OK, Json(json!({"status": "ready"})))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "starting"})),
        )
    }
}
