//! Per-session accumulator for streamed PCM audio.

use serde::Deserialize;

use super::{codec, SAMPLE_RATE};

/// Wire encoding of binary audio frames on the streaming endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PcmFormat {
    /// Little-endian signed 16-bit integers.
    Int16,
    /// Little-endian IEEE-754 32-bit floats.
    Float32,
}

/// Transient audio accumulator owned by one streaming session.
///
/// Created on WebSocket accept and dropped on close. All appended chunks are
/// converted to f32 immediately; [`StreamBuffer::take_samples`] drains the
/// buffer (peak-normalized) for a transcription attempt.
#[derive(Debug)]
pub struct StreamBuffer {
    sample_rate: u32,
    threshold_ms: u64,
    samples: Vec<f32>,
    total_samples_received: u64,
}

impl StreamBuffer {
    /// Create an empty buffer. `threshold_ms` is the minimum amount of audio
    /// that must accumulate before a transcription attempt is permitted.
    pub fn new(threshold_ms: u64) -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            threshold_ms,
            samples: Vec::new(),
            total_samples_received: 0,
        }
    }

    /// Append a binary frame interpreted under the given sample format.
    pub fn append(&mut self, format: PcmFormat, bytes: &[u8]) {
        match format {
            PcmFormat::Int16 => self.append_int16(bytes),
            PcmFormat::Float32 => self.append_float32(bytes),
        }
    }

    /// Append little-endian int16 PCM. A trailing odd byte is dropped.
    pub fn append_int16(&mut self, bytes: &[u8]) {
        if bytes.len() % 2 != 0 {
            tracing::warn!(bytes = bytes.len(), "odd-length int16 frame, truncating");
        }
        let added = bytes.len() / 2;
        self.samples.extend(
            bytes
                .chunks_exact(2)
                .map(|c| f32::from(i16::from_le_bytes([c[0], c[1]])) / 32_768.0),
        );
        self.total_samples_received += added as u64;
    }

    /// Append little-endian float32 PCM. A trailing partial sample is dropped.
    pub fn append_float32(&mut self, bytes: &[u8]) {
        if bytes.len() % 4 != 0 {
            tracing::warn!(bytes = bytes.len(), "ragged float32 frame, truncating");
        }
        let added = bytes.len() / 4;
        self.samples.extend(
            bytes
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])),
        );
        self.total_samples_received += added as u64;
    }

    /// Buffered audio duration in seconds.
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }

    /// Buffered audio duration in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        (self.duration() * 1000.0) as u64
    }

    /// Whether enough audio has accumulated for a transcription attempt.
    pub fn meets_threshold(&self) -> bool {
        self.duration_ms() >= self.threshold_ms
    }

    /// The configured minimum in milliseconds.
    pub fn threshold_ms(&self) -> u64 {
        self.threshold_ms
    }

    /// Total samples ever appended to this session (survives `take_samples`).
    pub fn total_samples_received(&self) -> u64 {
        self.total_samples_received
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Drain the buffer, peak-normalized to [-1, 1].
    pub fn take_samples(&mut self) -> Vec<f32> {
        let mut samples = std::mem::take(&mut self.samples);
        codec::normalize_peak(&mut samples);
        samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int16_chunks_decode_to_unit_range() {
        let mut buf = StreamBuffer::new(300);
        let frame: Vec<u8> = [0i16, 16_384, -16_384, 32_767, -32_768]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        buf.append_int16(&frame);
        assert_eq!(buf.len(), 5);
        let samples = buf.take_samples();
        assert!((samples[1] - 0.5).abs() < 1e-6);
        assert!((samples[2] + 0.5).abs() < 1e-6);
        assert!(samples.iter().all(|s| (-1.0..=1.0).contains(s)));
    }

    #[test]
    fn float32_chunks_pass_through() {
        let mut buf = StreamBuffer::new(300);
        let frame: Vec<u8> = [0.1f32, -0.2, 0.3]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        buf.append_float32(&frame);
        let samples = buf.take_samples();
        assert_eq!(samples.len(), 3);
        assert!((samples[2] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn odd_tail_is_dropped() {
        let mut buf = StreamBuffer::new(300);
        buf.append_int16(&[0, 0, 1]);
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn total_received_is_monotonic_across_drains() {
        let mut buf = StreamBuffer::new(0);
        buf.append_int16(&[0u8; 32]);
        let _ = buf.take_samples();
        buf.append_int16(&[0u8; 32]);
        assert_eq!(buf.total_samples_received(), 32);
        assert_eq!(buf.len(), 16);
    }

    #[test]
    fn threshold_tracks_duration() {
        // 80 ms of int16 at 16 kHz = 1280 samples = 2560 bytes.
        let mut buf = StreamBuffer::new(100);
        buf.append_int16(&vec![0u8; 2560]);
        assert!(!buf.meets_threshold());
        buf.append_int16(&vec![0u8; 2560]);
        assert!(buf.meets_threshold());
    }

    #[test]
    fn take_normalizes_out_of_range_floats() {
        let mut buf = StreamBuffer::new(0);
        let frame: Vec<u8> = [4.0f32, -2.0].iter().flat_map(|s| s.to_le_bytes()).collect();
        buf.append_float32(&frame);
        let samples = buf.take_samples();
        assert!((samples[0] - 1.0).abs() < 1e-6);
        assert!((samples[1] + 0.5).abs() < 1e-6);
    }
}
