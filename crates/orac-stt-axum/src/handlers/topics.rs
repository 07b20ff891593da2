//! Admin topic CRUD and per-topic routing configuration.

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use orac_stt_core::topics::TopicMetadata;
use orac_stt_core::TopicConfig;

use crate::error::HttpError;
use crate::state::AppState;

/// API projection of a [`TopicConfig`].
#[derive(Debug, Serialize)]
pub struct TopicResponse {
    pub name: String,
    pub is_active: bool,
    pub orac_core_url: Option<String>,
    pub last_seen: Option<String>,
    pub metadata: TopicMetadata,
    pub wake_words_to_strip: Option<String>,
}

impl From<TopicConfig> for TopicResponse {
    fn from(config: TopicConfig) -> Self {
        Self {
            is_active: config.is_active(),
            name: config.name,
            orac_core_url: config.orac_core_url,
            last_seen: config.last_seen.map(|t| t.to_rfc3339()),
            metadata: config.metadata,
            wake_words_to_strip: config.wake_words_to_strip,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TopicConfigUpdate {
    #[serde(default)]
    pub orac_core_url: Option<String>,
    #[serde(default)]
    pub wake_words_to_strip: Option<String>,
}

/// `GET /admin/topics`
pub async fn list(State(state): State<AppState>) -> Json<Vec<TopicResponse>> {
    let mut topics = state.registry.get_all();
    topics.sort_by(|a, b| a.name.cmp(&b.name));
    Json(topics.into_iter().map(TopicResponse::from).collect())
}

/// `GET /admin/topics/active`
pub async fn list_active(State(state): State<AppState>) -> Json<Vec<TopicResponse>> {
    let mut topics = state.registry.get_active();
    topics.sort_by(|a, b| a.name.cmp(&b.name));
    Json(topics.into_iter().map(TopicResponse::from).collect())
}

/// `GET /admin/topics/{name}`
pub async fn get(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<TopicResponse>, HttpError> {
    state
        .registry
        .get(&name)
        .map(|topic| Json(TopicResponse::from(topic)))
        .ok_or_else(|| HttpError::NotFound(format!("Topic '{name}' not found")))
}

/// `POST /admin/topics/{name}/config` — set Core URL override and strip list.
pub async fn update_config(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(update): Json<TopicConfigUpdate>,
) -> Result<Json<serde_json::Value>, HttpError> {
    if let Some(url) = &update.orac_core_url {
        validate_core_url(url)?;
    }

    state.registry.set_core_url(&name, update.orac_core_url.clone())?;
    state
        .registry
        .set_wake_words_to_strip(&name, update.wake_words_to_strip.clone())?;

    info!(
        topic = %name,
        core_url = ?update.orac_core_url,
        wake_words = ?update.wake_words_to_strip,
        "topic configuration updated"
    );
    Ok(Json(json!({
        "status": "ok",
        "message": format!("Topic '{name}' configuration updated"),
    })))
}

/// `DELETE /admin/topics/{name}/config` — drop the Core URL override.
pub async fn remove_config(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, HttpError> {
    if state.registry.get(&name).is_none() {
        return Err(HttpError::NotFound(format!("Topic '{name}' not found")));
    }
    state.registry.set_core_url(&name, None)?;
    info!(topic = %name, "Core URL override removed");
    Ok(Json(json!({
        "status": "ok",
        "message": format!("Topic '{name}' will use default Core URL"),
    })))
}

/// `DELETE /admin/topics/{name}`
pub async fn delete(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, HttpError> {
    if !state.registry.remove(&name)? {
        return Err(HttpError::NotFound(format!("Topic '{name}' not found")));
    }
    info!(topic = %name, "topic deleted");
    Ok(Json(json!({
        "status": "ok",
        "message": format!("Topic '{name}' deleted successfully"),
    })))
}

fn validate_core_url(url: &str) -> Result<(), HttpError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(HttpError::BadRequest(
            "URL must start with http:// or https://".to_string(),
        ))
    }
}
