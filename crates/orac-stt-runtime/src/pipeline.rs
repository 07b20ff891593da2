//! The per-utterance transcription pipeline.
//!
//! Both the upload and the streaming endpoints funnel into
//! [`TranscribePipeline::run`]; only the audio source differs. The pipeline
//! is best-effort end to end: engine failures produce a zero-valued reply
//! and a bracketed error entry in the history, never an error to the caller,
//! and the Core forward is a spawned task the response never waits on.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use orac_stt_core::topics::{sanitize_topic, strip_wake_words};
use orac_stt_core::{CommandBuffer, NewCommand, TopicRegistry};

use crate::core_client::CoreResolver;
use crate::engine::EngineClient;
use crate::snapshots::SnapshotStore;

/// Engine task. The canonical whisper-server backend transcribes either way;
/// the field is accepted for protocol compatibility with edge producers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    #[default]
    Transcribe,
    Translate,
}

/// Opaque timing strings passed through from the edge for latency
/// correlation on the Core side.
#[derive(Debug, Clone, Default)]
pub struct TimingHints {
    pub wake_word_time: Option<String>,
    pub recording_end_time: Option<String>,
}

/// One utterance ready for transcription: mono 16 kHz samples in [-1, 1].
#[derive(Debug)]
pub struct Utterance {
    pub samples: Vec<f32>,
    /// Audio duration in seconds.
    pub duration: f64,
    pub topic: String,
    pub language: Option<String>,
    pub task: Task,
    pub forward_to_core: bool,
    /// True on the WebSocket path; forwarded in metadata.
    pub streaming: bool,
    pub timing: TimingHints,
}

/// Response body for both transcription endpoints.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TranscriptionReply {
    pub text: String,
    pub confidence: f32,
    pub language: Option<String>,
    pub duration: f64,
    pub processing_time: f64,
}

/// Outcome of the engine call, branched on explicitly — no panics or
/// exceptions steer the pipeline.
#[derive(Debug, Clone)]
enum Outcome {
    Ok {
        text: String,
        confidence: f32,
        language: Option<String>,
    },
    Empty {
        language: Option<String>,
    },
    Failed {
        kind: &'static str,
        message: String,
    },
}

pub struct TranscribePipeline {
    engine: Arc<EngineClient>,
    history: Arc<CommandBuffer>,
    registry: Arc<TopicRegistry>,
    core: Arc<dyn CoreResolver>,
    snapshots: Arc<SnapshotStore>,
}

impl TranscribePipeline {
    pub fn new(
        engine: Arc<EngineClient>,
        history: Arc<CommandBuffer>,
        registry: Arc<TopicRegistry>,
        core: Arc<dyn CoreResolver>,
        snapshots: Arc<SnapshotStore>,
    ) -> Self {
        Self {
            engine,
            history,
            registry,
            core,
            snapshots,
        }
    }

    /// Run the full pipeline for one utterance.
    ///
    /// History insertion strictly precedes the forward decision; the forward
    /// itself runs concurrently with the reply being sent and never delays
    /// it.
    pub async fn run(&self, utterance: Utterance) -> TranscriptionReply {
        let stt_start = Utc::now();
        let started = Instant::now();

        // Snapshot first so even a failed attempt leaves replayable audio.
        let audio_path = self.snapshots.save(&utterance.samples, "[Processing...]");

        let outcome = match self
            .engine
            .transcribe(&utterance.samples, utterance.language.as_deref())
            .await
        {
            Ok(t) if t.text.is_empty() => Outcome::Empty { language: t.language },
            Ok(t) => Outcome::Ok {
                text: t.text,
                confidence: t.confidence,
                language: t.language,
            },
            Err(e) => {
                warn!(kind = e.kind(), error = %e, "transcription attempt failed");
                Outcome::Failed {
                    kind: e.kind(),
                    message: e.to_string(),
                }
            }
        };

        let processing_time = started.elapsed().as_secs_f64();
        let stt_end = Utc::now();

        let command = self.history.add(match &outcome {
            Outcome::Ok {
                text,
                confidence,
                language,
            } => NewCommand {
                text: text.clone(),
                audio_path: audio_path.clone(),
                duration: utterance.duration,
                confidence: *confidence,
                language: language.clone(),
                processing_time,
                has_error: false,
                error_message: None,
            },
            Outcome::Empty { language } => NewCommand {
                text: String::new(),
                audio_path: audio_path.clone(),
                duration: utterance.duration,
                confidence: 0.0,
                language: language.clone(),
                processing_time,
                has_error: false,
                error_message: None,
            },
            Outcome::Failed { message, .. } => NewCommand {
                text: format!("[Transcription Failed: {message}]"),
                audio_path: audio_path.clone(),
                duration: utterance.duration,
                confidence: 0.0,
                language: None,
                processing_time,
                has_error: true,
                error_message: Some(message.clone()),
            },
        });

        if let Outcome::Ok {
            text,
            confidence,
            language,
        } = &outcome
        {
            let should_forward = !text.is_empty() && !text.starts_with('[');
            if should_forward && utterance.forward_to_core {
                self.spawn_forward(
                    text.clone(),
                    &utterance,
                    *confidence,
                    language.clone(),
                    processing_time,
                    stt_start.to_rfc3339(),
                    stt_end.to_rfc3339(),
                );
            }
        }

        info!(
            command = %command.id,
            task = ?utterance.task,
            topic = %utterance.topic,
            processing_time,
            "utterance processed"
        );

        match outcome {
            Outcome::Ok {
                text,
                confidence,
                language,
            } => TranscriptionReply {
                text,
                confidence,
                language,
                duration: utterance.duration,
                processing_time,
            },
            Outcome::Empty { language } => TranscriptionReply {
                text: String::new(),
                confidence: 0.0,
                language,
                duration: utterance.duration,
                processing_time,
            },
            Outcome::Failed { .. } => TranscriptionReply {
                text: String::new(),
                confidence: 0.0,
                language: None,
                duration: utterance.duration,
                processing_time,
            },
        }
    }

    /// Record a failed attempt that never reached the engine (bad audio,
    /// too-short stream) and build the zero-valued reply for it.
    pub fn record_rejected(&self, reason: &str, processing_time: f64) -> TranscriptionReply {
        self.history.add(NewCommand {
            text: format!("[Invalid Audio: {reason}]"),
            audio_path: None,
            duration: 0.0,
            confidence: 0.0,
            language: None,
            processing_time,
            has_error: true,
            error_message: Some(format!("Invalid audio: {reason}")),
        });
        TranscriptionReply {
            processing_time,
            ..TranscriptionReply::default()
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn spawn_forward(
        &self,
        text: String,
        utterance: &Utterance,
        confidence: f32,
        language: Option<String>,
        processing_time: f64,
        stt_start_time: String,
        stt_end_time: String,
    ) {
        let topic = sanitize_topic(&utterance.topic).to_string();

        // The stored Command keeps the raw text; only the forwarded prompt
        // is stripped.
        let prompt = match self.registry.wake_words_to_strip(&topic) {
            Some(wake_words) => strip_wake_words(&text, &wake_words),
            None => text,
        };
        if prompt.is_empty() {
            info!(topic, "transcription was wake words only, forward suppressed");
            return;
        }

        let mut metadata = json!({
            "confidence": confidence,
            "language": language,
            "duration": utterance.duration,
            "processing_time": processing_time,
            "stt_start_time": stt_start_time,
            "stt_end_time": stt_end_time,
            "streaming": utterance.streaming,
        });
        if let Some(map) = metadata.as_object_mut() {
            if let Some(wake_word_time) = &utterance.timing.wake_word_time {
                map.insert("wake_word_time".into(), json!(wake_word_time));
            }
            if let Some(recording_end_time) = &utterance.timing.recording_end_time {
                map.insert("recording_end_time".into(), json!(recording_end_time));
            }
        }

        let sink = self.core.resolve(self.registry.core_url(&topic).as_deref());
        tokio::spawn(async move {
            if let Err(e) = sink.forward_transcription(&prompt, &topic, metadata).await {
                // At-most-once delivery: log and drop.
                warn!(topic, error = %e, "Core forward failed");
            }
        });
    }
}
