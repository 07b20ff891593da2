//! WebSocket streaming transcription.
//!
//! Protocol (server view), one utterance per connection:
//!
//! | Direction | Frame | Meaning |
//! |---|---|---|
//! | Client → Server | Binary | PCM chunk in the configured sample format |
//! | Client → Server | Text `{"type":"config", ...}` | Optional timing hints |
//! | Client → Server | Text `{"type":"ping"}` | Liveness; answered with `pong` |
//! | Client → Server | Text `{"type":"end"}` | Run the pipeline, send result, close |
//! | Server → Client | Text transcription JSON + `is_final: true` | Final result |
//! | Server → Client | Text `{"type":"error", ...}` | Bad audio; connection closes |
//!
//! Unknown control types are logged and ignored. Any transport error ends
//! the session and discards partial audio.

use std::time::Instant;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use serde_json::json;
use tracing::{debug, info, warn};

use orac_stt_core::audio::{StreamBuffer, MAX_DURATION_SECS};
use orac_stt_runtime::{Task, TimingHints, Utterance};

use crate::state::AppState;

/// `GET /stt/v1/ws/stream/{topic}` — WebSocket upgrade.
pub async fn stream(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(topic): Path<String>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_session(socket, state, topic))
}

async fn handle_session(mut socket: WebSocket, state: AppState, topic: String) {
    let started = Instant::now();
    let mut buffer = StreamBuffer::new(state.stream.threshold_ms);
    let mut timing = TimingHints::default();

    info!(topic = %topic, "streaming session opened");

    while let Some(message) = socket.recv().await {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                // Transport error: partial audio is discarded by design.
                warn!(topic = %topic, error = %e, "streaming session failed");
                return;
            }
        };

        match message {
            Message::Binary(data) => {
                buffer.append(state.stream.format, &data);
                if buffer.duration() > MAX_DURATION_SECS {
                    let reason = format!(
                        "audio duration {:.1}s exceeds maximum {MAX_DURATION_SECS:.1}s",
                        buffer.duration()
                    );
                    state
                        .pipeline
                        .record_rejected(&reason, started.elapsed().as_secs_f64());
                    let _ = send_error(&mut socket, &reason).await;
                    return;
                }
            }
            Message::Text(text) => {
                let Ok(control) = serde_json::from_str::<serde_json::Value>(&text) else {
                    warn!(topic = %topic, "unparseable control frame, ignoring");
                    continue;
                };
                match control.get("type").and_then(|t| t.as_str()) {
                    Some("config") => {
                        timing.wake_word_time = control
                            .get("wake_word_time")
                            .and_then(|v| v.as_str())
                            .map(ToString::to_string);
                        timing.recording_end_time = control
                            .get("recording_end_time")
                            .and_then(|v| v.as_str())
                            .map(ToString::to_string);
                        debug!(topic = %topic, "session config received");
                    }
                    Some("ping") => {
                        if socket
                            .send(Message::Text(json!({"type": "pong"}).to_string().into()))
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                    Some("end") => {
                        finish_session(socket, &state, &topic, &mut buffer, timing, started)
                            .await;
                        return;
                    }
                    other => {
                        warn!(topic = %topic, control_type = ?other, "unknown control frame, ignoring");
                    }
                }
            }
            Message::Close(_) => {
                info!(topic = %topic, "client closed before end-of-speech, discarding audio");
                return;
            }
            // Axum answers pings itself.
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }
}

/// Run the pipeline over the accumulated audio and send the single result
/// frame.
async fn finish_session(
    mut socket: WebSocket,
    state: &AppState,
    topic: &str,
    buffer: &mut StreamBuffer,
    timing: TimingHints,
    started: Instant,
) {
    if !buffer.meets_threshold() {
        let reason = format!(
            "audio duration {}ms below minimum {}ms",
            buffer.duration_ms(),
            buffer.threshold_ms()
        );
        warn!(topic = %topic, "{reason}");
        state
            .pipeline
            .record_rejected(&reason, started.elapsed().as_secs_f64());
        let _ = send_error(&mut socket, &reason).await;
        return;
    }

    let duration = buffer.duration();
    let samples = buffer.take_samples();
    info!(topic = %topic, duration, "end-of-speech, transcribing");

    let reply = state
        .pipeline
        .run(Utterance {
            samples,
            duration,
            topic: topic.to_string(),
            language: None,
            task: Task::Transcribe,
            forward_to_core: true,
            streaming: true,
            timing,
        })
        .await;

    state.metrics.audio_duration.observe(reply.duration);

    let mut payload = serde_json::to_value(&reply).unwrap_or_else(|_| json!({}));
    if let Some(map) = payload.as_object_mut() {
        map.insert("is_final".to_string(), json!(true));
    }

    if socket
        .send(Message::Text(payload.to_string().into()))
        .await
        .is_err()
    {
        warn!(topic = %topic, "client vanished before the result frame");
        return;
    }
    let _ = socket.send(Message::Close(None)).await;
}

async fn send_error(socket: &mut WebSocket, message: &str) -> Result<(), axum::Error> {
    socket
        .send(Message::Text(
            json!({"type": "error", "message": message}).to_string().into(),
        ))
        .await?;
    socket.send(Message::Close(None)).await
}
