//! PCM16 wire codec.
//!
//! Pure, stateless transforms between interleaved 16-bit samples and the
//! base64 payload carried by `input_audio_buffer.append` and
//! `response.audio.delta` frames. `decode(encode(x)) == x` for every valid
//! frame; that round trip is the component's contract.

use base64::prelude::*;

use super::AudioError;

/// Pack samples as little-endian PCM16 and base64-encode them.
pub fn encode(samples: &[i16]) -> String {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    BASE64_STANDARD.encode(bytes)
}

/// Exact inverse of [`encode`].
pub fn decode(encoded: &str) -> Result<Vec<i16>, AudioError> {
    let bytes = BASE64_STANDARD
        .decode(encoded)
        .map_err(|e| AudioError::Decode(e.to_string()))?;
    if bytes.len() % 2 != 0 {
        return Err(AudioError::Decode(format!(
            "odd PCM16 payload length: {}",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}
