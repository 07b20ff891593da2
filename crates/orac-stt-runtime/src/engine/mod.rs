//! The whisper engine: HTTP client, model catalog, subprocess supervisor.

pub mod catalog;
mod client;
mod supervisor;

pub use catalog::{model_file, ModelInfo, MODELS};
pub use client::{EngineClient, EngineError, Transcription, INFERENCE_TIMEOUT};
pub use supervisor::{
    EngineState, EngineStatus, EngineSupervisor, ModelSwap, SupervisorConfig, SupervisorError,
};
