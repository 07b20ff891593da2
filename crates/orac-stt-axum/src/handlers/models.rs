//! Admin model catalog and engine control.
//!
//! Model swaps go through the supervisor exclusively — this handler never
//! touches the engine process itself, so it cannot race the watchdog.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use orac_stt_runtime::engine::catalog;

use crate::error::HttpError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ModelEntry {
    pub name: &'static str,
    pub current: bool,
    pub size_mb: u32,
    pub description: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct ModelSelectRequest {
    pub model_name: String,
}

/// `GET /admin/models`
pub async fn list(State(state): State<AppState>) -> Json<Vec<ModelEntry>> {
    let current = state.supervisor.status().model_name;
    Json(
        catalog::MODELS
            .iter()
            .map(|m| ModelEntry {
                name: m.name,
                current: m.name == current,
                size_mb: m.size_mb,
                description: m.description,
            })
            .collect(),
    )
}

/// `POST /admin/models/select` — swap models via a synchronous engine
/// restart and report the result.
pub async fn select(
    State(state): State<AppState>,
    Json(request): Json<ModelSelectRequest>,
) -> Result<Json<serde_json::Value>, HttpError> {
    let swap = state.supervisor.swap_model(&request.model_name).await?;

    // Dashboards watching /admin/ws pick up the new model immediately.
    let _ = state.model_events.send(swap.model.clone());

    info!(model = %swap.model, restart_count = swap.restart_count, "model swap complete");
    Ok(Json(json!({
        "status": "success",
        "message": format!("Switched to {}", swap.model),
        "restart_required": swap.restart_required,
        "restart_count": swap.restart_count,
    })))
}

/// `POST /admin/models/restart` — restart the engine with its current model.
pub async fn restart(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, HttpError> {
    state.supervisor.restart().await?;
    let status = state.supervisor.status();
    Ok(Json(json!({
        "status": "success",
        "message": "Engine restarted",
        "restart_count": status.restart_count,
    })))
}
