//! Domain types and process-scoped state for the ORAC STT service.
//!
//! This crate holds everything that is independent of HTTP and of the
//! whisper-server subprocess: the audio buffer and codec, the command history
//! ring, the topic registry with its YAML snapshot, the heartbeat wire model,
//! and the runtime-mutable settings store. Process lifecycle (engine
//! supervision, Core forwarding) lives in `orac-stt-runtime`; the web adapter
//! lives in `orac-stt-axum`.

pub mod audio;
pub mod heartbeat;
pub mod history;
pub mod persist;
pub mod settings;
pub mod topics;

pub use audio::{AudioError, DecodedAudio, PcmFormat, StreamBuffer};
pub use heartbeat::{
    CoreHeartbeatRequest, HeartbeatRequest, HeartbeatResponse, ModelHeartbeat, ModelStatus,
    TopicHeartbeat,
};
pub use history::{Command, CommandBuffer, NewCommand};
pub use persist::StoreError;
pub use settings::{Settings, SettingsStore};
pub use topics::{strip_wake_words, TopicConfig, TopicRegistry, DEFAULT_TOPIC};
