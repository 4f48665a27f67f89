//! Amplitude normalization between integer PCM and the float domain
//!
//! Scale factor is the full-scale magnitude 2^(bits-1) of the bit depth.
//! Unknown bit depths are rejected instead of passing raw integers through,
//! since mixing domains silently yields near-silent or clipped audio.

use crate::codec::AudioBuffer;
use crate::error::{Result, ScrubError};

/// Full-scale magnitude and representable range for a bit depth
fn full_scale(bit_depth: u16) -> Result<(f64, i64, i64)> {
    match bit_depth {
        16 => Ok((32768.0, i16::MIN as i64, i16::MAX as i64)),
        32 => Ok((2_147_483_648.0, i32::MIN as i64, i32::MAX as i64)),
        other => Err(ScrubError::UnsupportedBitDepth(other)),
    }
}

/// Convert integer PCM to float samples in [-1.0, 1.0]
pub fn to_float(samples: &[i32], bit_depth: u16) -> Result<Vec<f32>> {
    let (scale, _, _) = full_scale(bit_depth)?;
    Ok(samples.iter().map(|&s| (s as f64 / scale) as f32).collect())
}

/// Convert float samples back to integer PCM
///
/// Values are scaled, clamped to the representable range, then truncated,
/// so out-of-range input saturates instead of wrapping.
pub fn to_int(samples: &[f32], bit_depth: u16) -> Result<Vec<i32>> {
    let (scale, min, max) = full_scale(bit_depth)?;
    let (min, max) = (min as f64, max as f64);
    Ok(samples
        .iter()
        .map(|&s| (s as f64 * scale).clamp(min, max) as i32)
        .collect())
}

/// Scale a buffer so its peak sits at `target_dbfs`
///
/// Silent buffers are returned unchanged.
pub fn normalize_peak(mut buffer: AudioBuffer, target_dbfs: f32) -> AudioBuffer {
    let peak = buffer.peak();
    if peak <= 0.0 {
        return buffer;
    }

    let target = 10.0_f32.powf(target_dbfs.min(0.0) / 20.0);
    let gain = target / peak;
    for sample in buffer.samples.iter_mut() {
        *sample *= gain;
    }

    log::debug!(
        "Peak normalized {:.1} dBFS -> {:.1} dBFS (gain {:.3})",
        20.0 * peak.log10(),
        target_dbfs,
        gain
    );

    buffer
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_16_bit_scale() {
        let floats = to_float(&[-32768, 0, 16384, 32767], 16).unwrap();
        assert_eq!(floats[0], -1.0);
        assert_eq!(floats[1], 0.0);
        assert_eq!(floats[2], 0.5);
        assert!(floats[3] < 1.0);
    }

    #[test]
    fn test_32_bit_scale() {
        let floats = to_float(&[i32::MIN, 1 << 30], 32).unwrap();
        assert_eq!(floats[0], -1.0);
        assert_eq!(floats[1], 0.5);
    }

    #[test]
    fn test_16_bit_round_trip_is_exact_for_every_value() {
        let all: Vec<i32> = (i16::MIN as i32..=i16::MAX as i32).collect();
        let back = to_int(&to_float(&all, 16).unwrap(), 16).unwrap();
        assert_eq!(back, all);
    }

    #[test]
    fn test_32_bit_round_trip() {
        // Values that fit the f32 mantissa survive exactly
        let exact: Vec<i32> = vec![i32::MIN, -(1 << 24), -256, 0, 256, 1 << 24, 0x7FFF_FF00];
        let back = to_int(&to_float(&exact, 32).unwrap(), 32).unwrap();
        assert_eq!(back, exact);

        // Everything else is within f32 rounding
        let arbitrary: Vec<i32> = (0..2000).map(|i| i * 1_073_741 - 1_000_000_000).collect();
        let back = to_int(&to_float(&arbitrary, 32).unwrap(), 32).unwrap();
        for (a, b) in arbitrary.iter().zip(&back) {
            assert!((*a as i64 - *b as i64).abs() <= 128, "{} -> {}", a, b);
        }
    }

    #[test]
    fn test_to_int_clamps_instead_of_wrapping() {
        let ints = to_int(&[1.0, 1.5, -1.0, -3.0], 16).unwrap();
        assert_eq!(ints, vec![32767, 32767, -32768, -32768]);

        let ints = to_int(&[1.0, -2.0], 32).unwrap();
        assert_eq!(ints, vec![i32::MAX, i32::MIN]);
    }

    #[test]
    fn test_unsupported_bit_depth() {
        assert!(matches!(to_float(&[1, 2], 24), Err(ScrubError::UnsupportedBitDepth(24))));
        assert!(matches!(to_int(&[0.1], 8), Err(ScrubError::UnsupportedBitDepth(8))));
    }

    #[test]
    fn test_normalize_peak() {
        let buffer = AudioBuffer::mono(vec![0.25, -0.5, 0.1], 8000);
        let out = normalize_peak(buffer, 0.0);
        assert!((out.peak() - 1.0).abs() < 1e-6);
        assert!((out.samples[0] - 0.5).abs() < 1e-6);

        let silent = AudioBuffer::mono(vec![0.0; 4], 8000);
        assert_eq!(normalize_peak(silent.clone(), -1.0), silent);
    }
}
