//! Bounded command history with broadcast fan-out.
//!
//! Every transcription attempt — success or failure — becomes a [`Command`]
//! at the head of a fixed-capacity ring. Subscribers receive each insertion
//! over a bounded broadcast channel: a slow subscriber drops its own backlog
//! without stalling the producer or other subscribers.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

/// Default ring capacity.
pub const DEFAULT_CAPACITY: usize = 5;

/// Per-subscriber broadcast queue depth.
const EVENT_QUEUE_DEPTH: usize = 32;

/// A single transcription event.
#[derive(Debug, Clone, Serialize)]
pub struct Command {
    /// Unique within the process lifetime.
    pub id: String,
    /// Transcribed text, or a bracketed tag such as
    /// `[Transcription Failed: ...]` when `has_error` is set.
    pub text: String,
    /// On-disk WAV snapshot, when one was written. The snapshot ring evicts
    /// independently of this ring, so the file may be gone by read time.
    pub audio_path: Option<PathBuf>,
    pub timestamp: DateTime<Utc>,
    /// Audio duration in seconds.
    pub duration: f64,
    /// Synthesized liveness signal, not a probability: 0.95 on non-empty
    /// engine output, 0.0 otherwise.
    pub confidence: f32,
    pub language: Option<String>,
    /// Wall-clock processing time in seconds.
    pub processing_time: f64,
    pub has_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Fields the caller supplies for a new ring entry; id and timestamp are
/// assigned on insert.
#[derive(Debug, Clone, Default)]
pub struct NewCommand {
    pub text: String,
    pub audio_path: Option<PathBuf>,
    pub duration: f64,
    pub confidence: f32,
    pub language: Option<String>,
    pub processing_time: f64,
    pub has_error: bool,
    pub error_message: Option<String>,
}

/// Fixed-capacity ring of recent commands.
pub struct CommandBuffer {
    capacity: usize,
    buffer: Mutex<VecDeque<Command>>,
    events: broadcast::Sender<Command>,
}

impl CommandBuffer {
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(EVENT_QUEUE_DEPTH);
        Self {
            capacity: capacity.max(1),
            buffer: Mutex::new(VecDeque::with_capacity(capacity)),
            events,
        }
    }

    /// Insert a command at the head, evicting the oldest entry at capacity.
    ///
    /// The broadcast fires after the lock is released, so subscriber order
    /// always matches insertion order.
    pub fn add(&self, new: NewCommand) -> Command {
        let command = Command {
            id: uuid::Uuid::new_v4().to_string(),
            text: if new.text.is_empty() {
                "[No transcription]".to_string()
            } else {
                new.text
            },
            audio_path: new.audio_path,
            timestamp: Utc::now(),
            duration: new.duration,
            confidence: new.confidence,
            language: new.language,
            processing_time: new.processing_time,
            has_error: new.has_error,
            error_message: new.error_message,
        };

        {
            let mut buffer = self.buffer.lock().unwrap();
            if buffer.len() == self.capacity {
                buffer.pop_front();
                tracing::debug!("command ring full, evicted oldest entry");
            }
            buffer.push_back(command.clone());
        }

        tracing::info!(id = %command.id, has_error = command.has_error, "command recorded");

        // No receivers is the normal idle state, not an error.
        let _ = self.events.send(command.clone());

        command
    }

    /// Snapshot of recent commands, newest first.
    pub fn list(&self, limit: Option<usize>) -> Vec<Command> {
        let buffer = self.buffer.lock().unwrap();
        let mut commands: Vec<Command> = buffer.iter().rev().cloned().collect();
        if let Some(limit) = limit {
            commands.truncate(limit);
        }
        commands
    }

    /// Look up one command by id. Linear scan over at most `capacity` entries.
    pub fn get(&self, id: &str) -> Option<Command> {
        let buffer = self.buffer.lock().unwrap();
        buffer.iter().find(|c| c.id == id).cloned()
    }

    /// Subscribe to future insertions.
    pub fn subscribe(&self) -> broadcast::Receiver<Command> {
        self.events.subscribe()
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.buffer.lock().unwrap().clear();
    }
}
