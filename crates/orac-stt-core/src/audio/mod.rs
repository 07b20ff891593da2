//! Audio buffering and codec utilities.
//!
//! Everything leaving this module is mono 16 kHz f32 PCM in [-1, 1] — the
//! only format the whisper engine accepts. Uploads arrive as WAV files and go
//! through [`decode_wav`]; streaming sessions feed raw PCM chunks into a
//! [`StreamBuffer`].

mod codec;
mod stream;

pub use codec::{decode_wav, encode_wav, normalize_peak, AudioError, DecodedAudio};
pub use stream::{PcmFormat, StreamBuffer};

/// Sample rate required by the whisper engine.
pub const SAMPLE_RATE: u32 = 16_000;

/// Hard cap on utterance length. Edge producers capture short commands;
/// anything longer is rejected rather than truncated.
pub const MAX_DURATION_SECS: f64 = 15.0;
