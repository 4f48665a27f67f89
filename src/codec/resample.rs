//! Sample rate conversion for decoded inputs

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use super::AudioBuffer;
use crate::error::{Result, ScrubError};

/// Input frames fed to the resampler per call
const CHUNK_SIZE: usize = 1024;

/// Resample a mono buffer to `target_rate`
///
/// Output length is `round(len * target_rate / source_rate)`.
pub fn resample(buffer: AudioBuffer, target_rate: u32) -> Result<AudioBuffer> {
    if target_rate == 0 || buffer.sample_rate == 0 {
        return Err(ScrubError::InvalidSignal(
            "Cannot resample with a zero sample rate".to_string(),
        ));
    }
    if buffer.sample_rate == target_rate || buffer.samples.is_empty() {
        return Ok(AudioBuffer {
            sample_rate: target_rate,
            ..buffer
        });
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = target_rate as f64 / buffer.sample_rate as f64;
    let target_len = (buffer.samples.len() as f64 * ratio).round() as usize;

    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, CHUNK_SIZE, 1)
        .map_err(|e| ScrubError::InvalidSignal(format!("Failed to create resampler: {}", e)))?;

    // The filter delays its output; drop that many leading frames and keep
    // flushing with silence until the tail has come out
    let delay = resampler.output_delay();
    let needed = delay + target_len;
    let mut output: Vec<f32> = Vec::with_capacity(needed + CHUNK_SIZE);

    let mut chunks = buffer.samples.chunks_exact(CHUNK_SIZE);
    for chunk in &mut chunks {
        let frames = resampler
            .process(&[chunk][..], None)
            .map_err(|e| ScrubError::InvalidSignal(format!("Failed to resample: {}", e)))?;
        output.extend_from_slice(&frames[0]);
    }

    let remainder = chunks.remainder();
    if !remainder.is_empty() {
        let frames = resampler
            .process_partial(Some(&[remainder][..]), None)
            .map_err(|e| ScrubError::InvalidSignal(format!("Failed to resample: {}", e)))?;
        output.extend_from_slice(&frames[0]);
    }

    while output.len() < needed {
        let frames = resampler
            .process_partial::<&[f32]>(None, None)
            .map_err(|e| ScrubError::InvalidSignal(format!("Failed to resample: {}", e)))?;
        if frames[0].is_empty() {
            break;
        }
        output.extend_from_slice(&frames[0]);
    }

    output.truncate(needed);
    let mut resampled = output.split_off(delay.min(output.len()));
    resampled.resize(target_len, 0.0);

    log::info!(
        "Resampled {}Hz -> {}Hz ({} samples)",
        buffer.sample_rate,
        target_rate,
        resampled.len()
    );

    Ok(AudioBuffer::mono(resampled, target_rate))
}
