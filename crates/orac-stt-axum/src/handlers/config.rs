//! Admin configuration for the default downstream Core.

use std::time::Duration;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use orac_stt_runtime::{CorePort, HttpCoreClient};

use crate::error::HttpError;
use crate::state::AppState;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
pub struct CoreConfigRequest {
    pub orac_core_url: String,
    #[serde(default)]
    pub timeout: Option<u64>,
}

/// `GET /admin/config/orac-core`
pub async fn get_core(State(state): State<AppState>) -> Json<serde_json::Value> {
    let settings = state.settings.get();
    Json(json!({
        "orac_core_url": settings.orac_core_url,
        "timeout": settings.orac_core_timeout_s,
    }))
}

/// `POST /admin/config/orac-core` — save the default Core URL.
///
/// The new endpoint is probed first; an unreachable Core downgrades the
/// response to a warning but does not reject the save, so operators can
/// configure a Core that is not up yet.
pub async fn set_core(
    State(state): State<AppState>,
    Json(request): Json<CoreConfigRequest>,
) -> Result<Json<serde_json::Value>, HttpError> {
    let url = request.orac_core_url.trim_end_matches('/').to_string();
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(HttpError::BadRequest(
            "URL must start with http:// or https://".to_string(),
        ));
    }

    let reachable = HttpCoreClient::new(&url, PROBE_TIMEOUT).health().await;

    state.settings.set_core_url(&url, request.timeout)?;
    info!(core_url = %url, timeout = ?request.timeout, "default Core updated");

    if reachable {
        Ok(Json(json!({
            "status": "success",
            "message": "ORAC Core configuration updated successfully",
            "url": url,
            "timeout": request.timeout.unwrap_or(30),
        })))
    } else {
        warn!(core_url = %url, "saved Core URL but the endpoint did not respond");
        Ok(Json(json!({
            "status": "warning",
            "message": "Configuration saved but ORAC Core connection test failed",
            "url": url,
            "timeout": request.timeout.unwrap_or(30),
        })))
    }
}

/// `POST /admin/config/orac-core/test` — probe the configured Core.
pub async fn test_core(State(state): State<AppState>) -> Json<serde_json::Value> {
    let client = state.core.default_client();
    let url = client.base_url().to_string();

    if client.health().await {
        Json(json!({
            "status": "success",
            "message": "ORAC Core connection successful",
            "url": url,
        }))
    } else {
        Json(json!({
            "status": "error",
            "message": "ORAC Core is not responding or unhealthy",
            "url": url,
        }))
    }
}
