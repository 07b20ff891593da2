//! HTTP client for the whisper-server inference endpoint.
//!
//! The engine exposes a single `POST /inference` taking a WAV file and
//! returning `{text, language?}`, plus a root URL that answers 200 once the
//! model is loaded. The confidence score in [`Transcription`] is synthesized
//! (0.95 on non-empty text, 0.0 otherwise) — the engine does not return one.
//! Downstream treats it as a liveness signal, not a probability.

use std::time::{Duration, Instant};

use serde::Deserialize;

use orac_stt_core::audio::{self, AudioError, SAMPLE_RATE};

/// Default end-to-end inference timeout.
pub const INFERENCE_TIMEOUT: Duration = Duration::from_secs(30);

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);
const READY_POLL_INTERVAL: Duration = Duration::from_secs(1);

const SYNTHETIC_CONFIDENCE: f32 = 0.95;

/// Errors from a transcription attempt.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("engine request timed out after {0:?}")]
    Timeout(Duration),

    #[error("engine unreachable at {0}")]
    Unreachable(String),

    #[error("engine returned HTTP {0}")]
    Http(u16),

    #[error("engine response invalid: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Audio(#[from] AudioError),
}

impl EngineError {
    /// Stable tag for metrics labels and bracketed error commands.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "engine_timeout",
            Self::Unreachable(_) => "engine_down",
            Self::Http(_) | Self::InvalidResponse(_) => "engine_error",
            Self::Audio(_) => "bad_audio",
        }
    }
}

/// A successful engine round trip.
#[derive(Debug, Clone)]
pub struct Transcription {
    /// Trimmed transcription text; may be empty (silence, noise).
    pub text: String,
    /// Synthesized: 0.95 when `text` is non-empty, otherwise 0.0.
    pub confidence: f32,
    /// Language reported by the engine, when it reports one.
    pub language: Option<String>,
    /// Wall-clock inference time in seconds.
    pub inference_seconds: f64,
}

#[derive(Debug, Deserialize)]
struct InferenceResponse {
    #[serde(default)]
    text: String,
    #[serde(default)]
    language: Option<String>,
}

/// One-shot RPC client for the engine. Cheap to clone; the underlying
/// connection pool is shared.
#[derive(Debug, Clone)]
pub struct EngineClient {
    base_url: String,
    inference_url: String,
    http: reqwest::Client,
    timeout: Duration,
    default_language: Option<String>,
}

impl EngineClient {
    pub fn new(base_url: &str, timeout: Duration, default_language: Option<String>) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            inference_url: format!("{base_url}/inference"),
            base_url,
            http: reqwest::Client::new(),
            timeout,
            default_language,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Transcribe mono 16 kHz samples.
    ///
    /// Serializes the samples into a 16-bit WAV and posts it as multipart
    /// `file` with `response_format=json` and the effective language.
    pub async fn transcribe(
        &self,
        samples: &[f32],
        language: Option<&str>,
    ) -> Result<Transcription, EngineError> {
        let wav = audio::encode_wav(samples, SAMPLE_RATE)?;

        let part = reqwest::multipart::Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| EngineError::InvalidResponse(e.to_string()))?;
        let mut form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("response_format", "json");
        if let Some(lang) = language.or(self.default_language.as_deref()) {
            form = form.text("language", lang.to_string());
        }

        let started = Instant::now();
        let response = self
            .http
            .post(&self.inference_url)
            .multipart(form)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::Http(status.as_u16()));
        }

        let body: InferenceResponse = response
            .json()
            .await
            .map_err(|e| EngineError::InvalidResponse(e.to_string()))?;

        let elapsed = started.elapsed().as_secs_f64();
        let text = body.text.trim().to_string();
        let confidence = if text.is_empty() {
            0.0
        } else {
            SYNTHETIC_CONFIDENCE
        };

        tracing::info!(
            inference_seconds = elapsed,
            text_len = text.len(),
            "engine transcription complete"
        );

        Ok(Transcription {
            text,
            confidence,
            language: body.language,
            inference_seconds: elapsed,
        })
    }

    /// Probe the engine root URL. 200 means the model is loaded.
    pub async fn health(&self) -> bool {
        match self
            .http
            .get(&self.base_url)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "engine health probe failed");
                false
            }
        }
    }

    /// Poll [`health`](Self::health) every second until it succeeds or the
    /// deadline elapses.
    pub async fn wait_ready(&self, deadline: Duration) -> bool {
        let started = Instant::now();
        loop {
            if self.health().await {
                tracing::info!(
                    elapsed_secs = started.elapsed().as_secs_f64(),
                    "engine is ready"
                );
                return true;
            }
            if started.elapsed() >= deadline {
                tracing::error!(deadline_secs = deadline.as_secs(), "engine not ready in time");
                return false;
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    fn classify(&self, e: reqwest::Error) -> EngineError {
        if e.is_timeout() {
            EngineError::Timeout(self.timeout)
        } else if e.is_connect() {
            EngineError::Unreachable(self.base_url.clone())
        } else {
            EngineError::InvalidResponse(e.to_string())
        }
    }
}
