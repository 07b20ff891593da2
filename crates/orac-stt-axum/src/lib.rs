//! Axum web adapter for the ORAC STT service.
//!
//! Exposes the edge-facing transcription endpoints (multipart upload and
//! WebSocket streaming), the heartbeat intake, and the admin surface, all
//! backed by the process-scoped state assembled in [`bootstrap`]. Handlers
//! stay thin: each one extracts, calls into `orac-stt-core` /
//! `orac-stt-runtime`, and maps the result to JSON.

pub mod bootstrap;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod state;

pub use bootstrap::{bootstrap, start_server, AppContext, ServerConfig, StreamSettings};
pub use error::HttpError;
pub use routes::create_router;
pub use state::AppState;
