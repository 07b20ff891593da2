//! WAV decode/encode and sample-rate conversion.

use std::io::Cursor;

use rubato::{FftFixedIn, Resampler as _};

use super::{MAX_DURATION_SECS, SAMPLE_RATE};

/// Errors from audio decoding and validation.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    /// The payload is not a parseable WAV file.
    #[error("invalid WAV data: {0}")]
    InvalidWav(String),

    /// WAV parsed but uses a sample encoding we do not accept.
    #[error("unsupported sample format: {bits}-bit {format}")]
    UnsupportedFormat { format: &'static str, bits: u16 },

    /// Utterance exceeds the hard duration cap.
    #[error("audio duration {duration:.1}s exceeds maximum {max:.1}s")]
    TooLong { duration: f64, max: f64 },

    /// Streaming session ended with less audio than the configured minimum.
    #[error("audio duration {got_ms}ms below minimum {threshold_ms}ms")]
    TooShort { got_ms: u64, threshold_ms: u64 },

    /// Sample-rate conversion failed.
    #[error("resampling failed: {0}")]
    Resample(String),

    /// WAV serialization failed.
    #[error("WAV encoding failed: {0}")]
    Encode(String),
}

/// Decoded, normalized audio ready for the engine.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Mono 16 kHz f32 samples in [-1, 1].
    pub samples: Vec<f32>,
    /// Duration in seconds at 16 kHz.
    pub duration: f64,
}

/// Decode a WAV payload into mono 16 kHz f32 samples.
///
/// Multi-channel input is downmixed by channel mean; other sample rates are
/// resampled. Accepts 16-bit integer and 32-bit float encodings — everything
/// else is rejected rather than guessed at.
pub fn decode_wav(bytes: &[u8]) -> Result<DecodedAudio, AudioError> {
    let reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| AudioError::InvalidWav(e.to_string()))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels);
    if channels == 0 {
        return Err(AudioError::InvalidWav("zero channels".into()));
    }

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, 16) => reader
            .into_samples::<i16>()
            .map(|s| s.map(|v| f32::from(v) / 32_768.0))
            .collect::<Result<_, _>>()
            .map_err(|e| AudioError::InvalidWav(e.to_string()))?,
        (hound::SampleFormat::Float, 32) => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| AudioError::InvalidWav(e.to_string()))?,
        (hound::SampleFormat::Int, bits) => {
            return Err(AudioError::UnsupportedFormat {
                format: "integer",
                bits,
            });
        }
        (hound::SampleFormat::Float, bits) => {
            return Err(AudioError::UnsupportedFormat {
                format: "float",
                bits,
            });
        }
    };

    let mono = if channels > 1 {
        downmix(&interleaved, channels)
    } else {
        interleaved
    };

    let samples = if spec.sample_rate == SAMPLE_RATE {
        mono
    } else {
        tracing::debug!(
            from = spec.sample_rate,
            to = SAMPLE_RATE,
            "resampling uploaded audio"
        );
        resample(&mono, spec.sample_rate, SAMPLE_RATE)?
    };

    let duration = samples.len() as f64 / f64::from(SAMPLE_RATE);
    if duration > MAX_DURATION_SECS {
        return Err(AudioError::TooLong {
            duration,
            max: MAX_DURATION_SECS,
        });
    }

    Ok(DecodedAudio { samples, duration })
}

/// Encode mono f32 samples as a 16-bit PCM WAV file in memory.
///
/// Values outside [-1, 1] are clamped before conversion.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, AudioError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| AudioError::Encode(e.to_string()))?;
        for &s in samples {
            let clamped = s.clamp(-1.0, 1.0);
            #[allow(clippy::cast_possible_truncation)]
            let value = (clamped * 32_767.0) as i16;
            writer
                .write_sample(value)
                .map_err(|e| AudioError::Encode(e.to_string()))?;
        }
        writer
            .finalize()
            .map_err(|e| AudioError::Encode(e.to_string()))?;
    }
    Ok(cursor.into_inner())
}

/// Clamp samples to [-1, 1] by dividing by the peak magnitude.
///
/// Audio already within range is left untouched.
pub fn normalize_peak(samples: &mut [f32]) {
    let peak = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    if peak > 1.0 {
        for s in samples.iter_mut() {
            *s /= peak;
        }
    }
}

/// Average interleaved channels into mono.
#[allow(clippy::cast_precision_loss)]
fn downmix(samples: &[f32], channels: usize) -> Vec<f32> {
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Resample audio using FFT-based band-limited conversion.
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, AudioError> {
    if samples.is_empty() {
        return Ok(Vec::new());
    }

    let chunk_size = 1024;

    let mut resampler = FftFixedIn::<f32>::new(
        from_rate as usize,
        to_rate as usize,
        chunk_size,
        2, // sub-chunks for quality
        1, // mono
    )
    .map_err(|e| AudioError::Resample(e.to_string()))?;

    let mut output = Vec::new();

    let mut pos = 0;
    while pos + chunk_size <= samples.len() {
        let chunk = &samples[pos..pos + chunk_size];
        let result = resampler
            .process(&[chunk], None)
            .map_err(|e| AudioError::Resample(e.to_string()))?;
        if let Some(channel) = result.first() {
            output.extend_from_slice(channel);
        }
        pos += chunk_size;
    }

    // Pad the tail with zeros and keep only the proportional output.
    if pos < samples.len() {
        let remaining = &samples[pos..];
        let mut padded = vec![0.0f32; chunk_size];
        padded[..remaining.len()].copy_from_slice(remaining);

        let result = resampler
            .process(&[&padded], None)
            .map_err(|e| AudioError::Resample(e.to_string()))?;
        if let Some(channel) = result.first() {
            #[allow(clippy::cast_precision_loss)]
            let output_len =
                (remaining.len() as f64 * f64::from(to_rate) / f64::from(from_rate)).ceil() as usize;
            let take = output_len.min(channel.len());
            output.extend_from_slice(&channel[..take]);
        }
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int16_fixture() -> Vec<i16> {
        (0..1600).map(|i| ((i % 256) - 128) as i16 * 200).collect()
    }

    fn wav_from_int16(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
        cursor.into_inner()
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = decode_wav(b"definitely not a wav file").unwrap_err();
        assert!(matches!(err, AudioError::InvalidWav(_)));
    }

    #[test]
    fn decode_accepts_mono_16k() {
        let samples = int16_fixture();
        let bytes = wav_from_int16(&samples, SAMPLE_RATE, 1);
        let decoded = decode_wav(&bytes).unwrap();
        assert_eq!(decoded.samples.len(), samples.len());
        assert!((decoded.duration - 0.1).abs() < 1e-9);
    }

    #[test]
    fn decode_downmixes_stereo() {
        // Left channel at +0.5, right at -0.5: the mean is zero.
        let mut interleaved = Vec::new();
        for _ in 0..800 {
            interleaved.push(16_384i16);
            interleaved.push(-16_384i16);
        }
        let bytes = wav_from_int16(&interleaved, SAMPLE_RATE, 2);
        let decoded = decode_wav(&bytes).unwrap();
        assert_eq!(decoded.samples.len(), 800);
        for s in decoded.samples {
            assert!(s.abs() < 1e-6);
        }
    }

    #[test]
    fn decode_resamples_8k_to_16k() {
        let samples: Vec<i16> = (0..800).map(|i| (i % 100) as i16 * 300).collect();
        let bytes = wav_from_int16(&samples, 8_000, 1);
        let decoded = decode_wav(&bytes).unwrap();
        // 0.1 s of audio at 16 kHz, within resampler edge tolerance.
        let expected = 1600usize;
        assert!(
            decoded.samples.len().abs_diff(expected) <= 64,
            "got {} samples, expected about {expected}",
            decoded.samples.len()
        );
    }

    #[test]
    fn decode_rejects_overlong_audio() {
        let n = (SAMPLE_RATE as f64 * (MAX_DURATION_SECS + 1.0)) as usize;
        let samples = vec![0i16; n];
        let bytes = wav_from_int16(&samples, SAMPLE_RATE, 1);
        let err = decode_wav(&bytes).unwrap_err();
        assert!(matches!(err, AudioError::TooLong { .. }));
    }

    #[test]
    fn decode_rejects_24_bit() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: SAMPLE_RATE,
            bits_per_sample: 24,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..100i32 {
            writer.write_sample(i << 8).unwrap();
        }
        writer.finalize().unwrap();
        let err = decode_wav(&cursor.into_inner()).unwrap_err();
        assert!(matches!(err, AudioError::UnsupportedFormat { bits: 24, .. }));
    }

    #[test]
    fn int16_round_trip_within_one_lsb() {
        let original = int16_fixture();
        let floats: Vec<f32> = original.iter().map(|&v| f32::from(v) / 32_768.0).collect();
        let wav = encode_wav(&floats, SAMPLE_RATE).unwrap();
        let decoded = decode_wav(&wav).unwrap();
        assert_eq!(decoded.samples.len(), original.len());
        for (f, &orig) in decoded.samples.iter().zip(&original) {
            let recovered = (f * 32_768.0).round() as i32;
            assert!(
                (recovered - i32::from(orig)).abs() <= 1,
                "sample drifted more than 1 LSB: {orig} -> {recovered}"
            );
        }
    }

    #[test]
    fn normalize_leaves_in_range_audio_untouched() {
        let mut samples = vec![0.5, -0.25, 0.99];
        let before = samples.clone();
        normalize_peak(&mut samples);
        assert_eq!(samples, before);
    }

    #[test]
    fn normalize_scales_by_peak() {
        let mut samples = vec![2.0, -1.0, 0.5];
        normalize_peak(&mut samples);
        assert!((samples[0] - 1.0).abs() < 1e-6);
        assert!((samples[1] + 0.5).abs() < 1e-6);
        assert!((samples[2] - 0.25).abs() < 1e-6);
    }
}
