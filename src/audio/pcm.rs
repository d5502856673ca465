//! 16-bit PCM wire codec and sample helpers shared by capture and playback.

use crate::error::SessionError;

/// Encode normalised samples as signed 16-bit little-endian PCM
pub fn encode_pcm16_le(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .flat_map(|s| s.to_le_bytes())
        .collect()
}

/// Decode signed 16-bit little-endian PCM into normalised samples
pub fn decode_pcm16_le(bytes: &[u8]) -> Result<Vec<f32>, SessionError> {
    if bytes.is_empty() {
        return Err(SessionError::Decode("empty audio payload".into()));
    }
    if bytes.len() % 2 != 0 {
        return Err(SessionError::Decode(format!(
            "odd PCM16 payload length: {} bytes",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect())
}

/// Average interleaved channels into a single mono channel
pub fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }

    samples
        .chunks_exact(channels as usize)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Speaking-volume estimate: RMS of the frame, scaled by `gain`, clamped to `[0, 1]`
pub fn rms_volume(samples: &[f32], gain: f32) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum: f32 = samples.iter().map(|s| s * s).sum();
    let rms = (sum / samples.len() as f32).sqrt();
    (rms * gain).clamp(0.0, 1.0)
}
