//! Runtime coordination for the ORAC STT service.
//!
//! This crate owns everything with a lifecycle: the whisper-server subprocess
//! and its supervisor, the HTTP clients for the engine and the downstream
//! Core, the heartbeat aggregator, the on-disk snapshot ring, and the
//! transcription pipeline that stitches them together. It knows nothing
//! about HTTP routing — the axum adapter calls into it.

pub mod aggregator;
pub mod core_client;
pub mod engine;
pub mod pipeline;
pub mod process;
pub mod snapshots;

pub use aggregator::{AggregatorConfig, AggregatorStatus, HeartbeatAggregator};
pub use core_client::{CoreForwardError, CorePort, CoreResolver, CoreRouter, HttpCoreClient};
pub use engine::{
    EngineClient, EngineError, EngineState, EngineStatus, EngineSupervisor, ModelSwap,
    SupervisorConfig, SupervisorError, Transcription, INFERENCE_TIMEOUT,
};
pub use pipeline::{Task, TimingHints, TranscribePipeline, TranscriptionReply, Utterance};
pub use snapshots::{SnapshotInfo, SnapshotStore};
