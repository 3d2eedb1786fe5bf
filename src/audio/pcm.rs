// 16-bit PCM helpers

/// Scale factor from [-1, 1] floats to signed 16-bit samples (0x7FFF)
pub const I16_SCALE: f32 = 0x7FFF as f32;

/// Convert floating-point samples to 16-bit PCM
///
/// Inputs are clamped to [-1, 1] before scaling, so out-of-range samples
/// saturate instead of wrapping.
pub fn float_to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * I16_SCALE).round() as i16)
        .collect()
}

/// Concatenate buffered chunks into one contiguous sample array
pub fn concat(chunks: &[Vec<i16>]) -> Vec<i16> {
    let total = chunks.iter().map(Vec::len).sum();
    let mut out = Vec::with_capacity(total);
    for chunk in chunks {
        out.extend_from_slice(chunk);
    }
    out
}

/// Serialize samples as little-endian bytes
pub fn to_le_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Parse little-endian bytes back into samples; a trailing odd byte is ignored
pub fn from_le_bytes(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect()
}
