//! Admin command history: listing, snapshot audio, live push channel.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use orac_stt_core::Command;

use crate::error::HttpError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

/// `GET /admin/commands` — recent transcriptions, newest first.
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<Command>> {
    Json(state.history.list(query.limit.or(Some(5))))
}

/// `GET /admin/commands/{id}/audio` — the snapshot WAV for one command.
pub async fn audio(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, HttpError> {
    let command = state
        .history
        .get(&id)
        .ok_or_else(|| HttpError::NotFound("Command not found".to_string()))?;

    // The snapshot ring evicts independently of the command ring.
    let path = command
        .audio_path
        .filter(|p| p.exists())
        .ok_or_else(|| HttpError::NotFound("Audio file not found".to_string()))?;

    let bytes = std::fs::read(&path)
        .map_err(|e| HttpError::Internal(format!("failed to read audio: {e}")))?;

    Ok((
        [
            (CONTENT_TYPE, "audio/wav".to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=command_{id}.wav"),
            ),
        ],
        bytes,
    )
        .into_response())
}

/// `GET /admin/ws` — live push channel for the dashboard.
///
/// Pushes `new_command` for every ring insertion and `model_changed` after a
/// model swap; answers a plain `ping` text frame with `pong`.
pub async fn admin_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_admin_ws(socket, state))
}

async fn handle_admin_ws(socket: WebSocket, state: AppState) {
    let mut commands = state.history.subscribe();
    let mut models = state.model_events.subscribe();
    let (mut sender, mut receiver) = socket.split();

    info!("admin live channel connected");
    if sender
        .send(Message::Text(
            json!({"type": "connected", "message": "Connected to ORAC STT Admin"})
                .to_string()
                .into(),
        ))
        .await
        .is_err()
    {
        return;
    }

    loop {
        tokio::select! {
            inbound = receiver.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        if text.as_str().trim() == "ping"
                            && sender.send(Message::Text("pong".into())).await.is_err()
                        {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(error = %e, "admin live channel transport error");
                        break;
                    }
                }
            }
            command = commands.recv() => {
                match command {
                    Ok(command) => {
                        let frame = json!({"type": "new_command", "command": command});
                        if sender.send(Message::Text(frame.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        // This subscriber fell behind; newer commands still flow.
                        warn!(missed, "admin live channel lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            model = models.recv() => {
                match model {
                    Ok(model) => {
                        let frame = json!({"type": "model_changed", "model": model});
                        if sender.send(Message::Text(frame.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    info!("admin live channel disconnected");
}
