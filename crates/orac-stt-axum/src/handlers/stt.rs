//! Upload transcription, preload and debug-recording endpoints.

use std::time::Instant;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use orac_stt_core::audio;
use orac_stt_core::topics::DEFAULT_TOPIC;
use orac_stt_runtime::{Task, TimingHints, TranscriptionReply, Utterance};

use crate::error::HttpError;
use crate::state::AppState;

/// Correlation headers passed through from the edge producer.
const WAKE_WORD_TIME_HEADER: &str = "x-wake-word-time";
const RECORDING_END_TIME_HEADER: &str = "x-recording-end-time";

fn default_forward() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub task: Task,
    #[serde(default = "default_forward")]
    pub forward_to_core: bool,
}

/// `POST /stt/v1/stream` — transcribe with the default topic.
pub async fn transcribe_default(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<TranscriptionReply>, HttpError> {
    transcribe_impl(state, DEFAULT_TOPIC.to_string(), query, &headers, multipart).await
}

/// `POST /stt/v1/stream/{topic}` — transcribe and route to a topic.
pub async fn transcribe_with_topic(
    State(state): State<AppState>,
    Path(topic): Path<String>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<TranscriptionReply>, HttpError> {
    transcribe_impl(state, topic, query, &headers, multipart).await
}

/// Shared upload path: read the `file` part, decode and validate, then run
/// the pipeline. Malformed audio is a 400; engine trouble is a zero-valued
/// 200 produced inside the pipeline.
async fn transcribe_impl(
    state: AppState,
    topic: String,
    query: UploadQuery,
    headers: &HeaderMap,
    multipart: Multipart,
) -> Result<Json<TranscriptionReply>, HttpError> {
    let started = Instant::now();

    let bytes = match read_file_part(multipart).await {
        Ok(bytes) => bytes,
        Err(reason) => {
            state
                .pipeline
                .record_rejected(&reason, started.elapsed().as_secs_f64());
            state
                .metrics
                .errors_total
                .with_label_values(&["bad_audio"])
                .inc();
            return Err(HttpError::BadRequest(reason));
        }
    };

    let decoded = match audio::decode_wav(&bytes) {
        Ok(decoded) => decoded,
        Err(e) => {
            warn!(error = %e, "upload rejected");
            state
                .pipeline
                .record_rejected(&e.to_string(), started.elapsed().as_secs_f64());
            state
                .metrics
                .errors_total
                .with_label_values(&["bad_audio"])
                .inc();
            return Err(HttpError::BadRequest(e.to_string()));
        }
    };

    info!(
        topic = %topic,
        duration = decoded.duration,
        size_bytes = bytes.len(),
        "audio loaded"
    );

    let mut samples = decoded.samples;
    audio::normalize_peak(&mut samples);

    let utterance = Utterance {
        samples,
        duration: decoded.duration,
        topic,
        language: query.language,
        task: query.task,
        forward_to_core: query.forward_to_core,
        streaming: false,
        timing: timing_from_headers(headers),
    };

    let reply = state.pipeline.run(utterance).await;
    record_metrics(&state, &reply);
    Ok(Json(reply))
}

/// Pull the `file` field out of the multipart body.
async fn read_file_part(mut multipart: Multipart) -> Result<Vec<u8>, String> {
    loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|e| format!("malformed multipart body: {e}"))?;
        let Some(field) = field else {
            return Err("missing 'file' field in multipart body".to_string());
        };
        if field.name() == Some("file") {
            return field
                .bytes()
                .await
                .map(|b| b.to_vec())
                .map_err(|e| format!("failed to read upload: {e}"));
        }
    }
}

fn timing_from_headers(headers: &HeaderMap) -> TimingHints {
    let get = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string)
    };
    TimingHints {
        wake_word_time: get(WAKE_WORD_TIME_HEADER),
        recording_end_time: get(RECORDING_END_TIME_HEADER),
    }
}

fn record_metrics(state: &AppState, reply: &TranscriptionReply) {
    state.metrics.audio_duration.observe(reply.duration);
    let model = state.supervisor.status().model_name;
    state
        .metrics
        .inference_duration
        .with_label_values(&[&model])
        .observe(reply.processing_time);
    if reply.text.is_empty() && reply.confidence < f32::EPSILON {
        state
            .metrics
            .errors_total
            .with_label_values(&["transcription_empty_or_failed"])
            .inc();
    }
}

/// `POST /stt/v1/preload` — force the engine through its readiness gate.
pub async fn preload(State(state): State<AppState>) -> Result<Json<serde_json::Value>, HttpError> {
    let load_time = state.supervisor.ensure_ready().await?;
    Ok(Json(json!({
        "status": "success",
        "message": format!("Model ready in {load_time:.2}s"),
    })))
}

/// `GET /stt/v1/health` — engine-focused sub-report.
pub async fn engine_health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let engine = state.supervisor.status();
    let reachable = state.supervisor.probe_health().await;

    let status = if reachable {
        "healthy"
    } else if state.supervisor.ever_ready() {
        "unhealthy"
    } else {
        "initializing"
    };

    Json(json!({
        "status": status,
        "model_loaded": reachable,
        "model_name": engine.model_name,
        "backend": "whisper_server",
        "server_url": engine.server_url,
        "state": engine.state,
    }))
}

/// `GET /stt/v1/debug/recordings`
pub async fn list_recordings(State(state): State<AppState>) -> Json<serde_json::Value> {
    let recordings = state.snapshots.list();
    Json(json!({
        "count": recordings.len(),
        "max_recordings": state.snapshots.max_files(),
        "recordings": recordings,
    }))
}

/// `GET /stt/v1/debug/recordings/{filename}`
pub async fn get_recording(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, HttpError> {
    let path = state
        .snapshots
        .resolve(&filename)
        .ok_or_else(|| HttpError::NotFound("Recording not found".to_string()))?;

    let bytes = std::fs::read(&path)
        .map_err(|e| HttpError::Internal(format!("failed to read recording: {e}")))?;

    Ok((
        [
            (CONTENT_TYPE, "audio/wav".to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename={filename}"),
            ),
        ],
        bytes,
    )
        .into_response())
}
