//! Request handlers, grouped by surface.

pub mod commands;
pub mod config;
pub mod health;
pub mod heartbeat;
pub mod models;
pub mod stream_ws;
pub mod stt;
pub mod topics;
