//! Heartbeat intake from edge producers.

use axum::extract::State;
use axum::Json;

use orac_stt_core::{HeartbeatRequest, HeartbeatResponse};
use orac_stt_runtime::AggregatorStatus;

use crate::state::AppState;

/// `POST /stt/v1/heartbeat` — batched heartbeat from one producer instance.
pub async fn receive(
    State(state): State<AppState>,
    Json(request): Json<HeartbeatRequest>,
) -> Json<HeartbeatResponse> {
    Json(state.aggregator.process(request).await)
}

/// `GET /stt/v1/heartbeat/status` — aggregator snapshot.
pub async fn status(State(state): State<AppState>) -> Json<AggregatorStatus> {
    Json(state.aggregator.status())
}
