//! Soft gating mask over the time-frequency grid

use super::noise_profile::NoiseProfile;
use super::stft::Spectrum;

/// Gate floor used in place of zero so silent bins map to "noise", not NaN
const MIN_GATE: f32 = 1e-10;

/// Keep probability per bin: `sigmoid(slope * (|X| / gate - 1))`
///
/// Values near 0 mark noise, values near 1 mark signal.
pub fn gate_mask(
    magnitudes: &[f32],
    profile: &NoiseProfile,
    n_frames: usize,
    n_bins: usize,
    slope: f32,
) -> Vec<f32> {
    let mut mask = vec![0.0f32; n_frames * n_bins];

    for t in 0..n_frames {
        for f in 0..n_bins {
            let idx = t * n_bins + f;
            let gate = profile.gate(t, f).max(MIN_GATE);
            let ratio = magnitudes[idx] / gate;
            mask[idx] = sigmoid(slope * (ratio - 1.0));
        }
    }

    mask
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Triangular weights `1, 2, ..., n+1, ..., 2, 1` for a half-width of `n`
fn triangle(half_width: usize) -> Vec<f32> {
    (0..=2 * half_width)
        .map(|i| (half_width + 1 - i.abs_diff(half_width)) as f32)
        .collect()
}

/// Convolve one strided line with a triangular kernel, renormalizing at edges
fn smooth_line(
    values: &mut [f32],
    start: usize,
    stride: usize,
    len: usize,
    kernel: &[f32],
    scratch: &mut Vec<f32>,
) {
    let half = kernel.len() / 2;

    scratch.clear();
    scratch.extend((0..len).map(|i| values[start + i * stride]));

    for i in 0..len {
        let lo = i.saturating_sub(half);
        let hi = (i + half + 1).min(len);
        let mut acc = 0.0f32;
        let mut weight = 0.0f32;
        for j in lo..hi {
            let w = kernel[j + half - i];
            acc += scratch[j] * w;
            weight += w;
        }
        values[start + i * stride] = acc / weight;
    }
}

/// Separable triangular smoothing along frequency, then time
///
/// A half-width of zero leaves that axis untouched. Output stays in [0, 1]
/// since every output is a convex combination of inputs.
pub fn smooth_mask(
    mask: &mut [f32],
    n_frames: usize,
    n_bins: usize,
    freq_half_width: usize,
    time_half_width: usize,
) {
    let mut scratch = Vec::new();
    // Wider kernels than the line itself change nothing but the cost
    let freq_half_width = freq_half_width.min(n_bins);
    let time_half_width = time_half_width.min(n_frames);

    if freq_half_width > 0 {
        let kernel = triangle(freq_half_width);
        for t in 0..n_frames {
            smooth_line(mask, t * n_bins, 1, n_bins, &kernel, &mut scratch);
        }
    }

    if time_half_width > 0 {
        let kernel = triangle(time_half_width);
        for f in 0..n_bins {
            smooth_line(mask, f, n_bins, n_frames, &kernel, &mut scratch);
        }
    }
}

/// Scale every complex bin by `1 - prop_decrease * (1 - keep)`
///
/// Phase is untouched.
pub fn apply_mask(spectrum: &mut Spectrum, mask: &[f32], prop_decrease: f32) {
    let prop = prop_decrease.clamp(0.0, 1.0);
    for (bin, &keep) in spectrum.bins.iter_mut().zip(mask) {
        let gain = 1.0 - prop * (1.0 - keep);
        *bin *= gain;
    }
}
