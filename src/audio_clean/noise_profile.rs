//! Noise floor estimation
//!
//! Produces a gate magnitude for every time-frequency bin. Bins whose
//! magnitude falls under their gate are treated as noise by the mask stage.
//!
//! - Stationary: one gate per bin from mean + k·std of the bin's level (dB)
//!   over the whole signal.
//! - Non-stationary: per bin, a zero-phase exponentially weighted moving
//!   average of magnitude over time tracks drifting noise. The floor at each
//!   bin is the median of that rolling statistic over a frequency
//!   neighbourhood, so steady narrowband components (tones, held vowels)
//!   stand out against it instead of becoming part of it.

/// Magnitudes below this are treated as -200 dB
const MIN_MAGNITUDE: f32 = 1e-10;

/// Per-bin gate magnitudes, built fresh for every signal
#[derive(Debug, Clone)]
pub struct NoiseProfile {
    gate: Vec<f32>,
    n_bins: usize,
    per_frame: bool,
}

impl NoiseProfile {
    /// Whole-signal statistics: gate = 10^((mean_db + n_std * std_db) / 20)
    pub fn stationary(magnitudes: &[f32], n_frames: usize, n_bins: usize, n_std: f32) -> Self {
        let mut gate = vec![0.0f32; n_bins];

        if n_frames > 0 {
            for (f, g) in gate.iter_mut().enumerate() {
                let mut sum = 0.0f64;
                let mut sum_sq = 0.0f64;
                for t in 0..n_frames {
                    let db = amp_to_db(magnitudes[t * n_bins + f]) as f64;
                    sum += db;
                    sum_sq += db * db;
                }
                let mean = sum / n_frames as f64;
                let variance = (sum_sq / n_frames as f64 - mean * mean).max(0.0);
                let thresh_db = mean + n_std as f64 * variance.sqrt();
                *g = 10.0_f64.powf(thresh_db / 20.0) as f32;
            }
        }

        Self {
            gate,
            n_bins,
            per_frame: false,
        }
    }

    /// Rolling floor tracking noise that drifts over time
    ///
    /// * `alpha` - EWMA coefficient per frame, `1 - exp(-hop_seconds / time_constant)`
    /// * `floor_half_width` - frequency neighbourhood half-width in bins for the median
    /// * `multiplier` - gate = floor * multiplier
    pub fn non_stationary(
        magnitudes: &[f32],
        n_frames: usize,
        n_bins: usize,
        alpha: f32,
        floor_half_width: usize,
        multiplier: f32,
    ) -> Self {
        let mut smoothed = magnitudes[..n_frames * n_bins].to_vec();
        if n_frames > 0 {
            smooth_over_time(&mut smoothed, n_frames, n_bins, alpha);
        }

        let floor_half_width = floor_half_width.min(n_bins);
        let mut gate = vec![0.0f32; n_frames * n_bins];
        let mut neighbourhood: Vec<f32> = Vec::with_capacity(2 * floor_half_width + 1);

        for t in 0..n_frames {
            let row = &smoothed[t * n_bins..(t + 1) * n_bins];
            let gate_row = &mut gate[t * n_bins..(t + 1) * n_bins];

            for (f, g) in gate_row.iter_mut().enumerate() {
                let lo = f.saturating_sub(floor_half_width);
                let hi = (f + floor_half_width + 1).min(n_bins);

                neighbourhood.clear();
                neighbourhood.extend_from_slice(&row[lo..hi]);
                let mid = neighbourhood.len() / 2;
                let (_, median, _) = neighbourhood.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));

                *g = *median * multiplier;
            }
        }

        Self {
            gate,
            n_bins,
            per_frame: true,
        }
    }

    /// Gate magnitude for frame `t`, bin `f`
    #[inline]
    pub fn gate(&self, t: usize, f: usize) -> f32 {
        if self.per_frame {
            self.gate[t * self.n_bins + f]
        } else {
            self.gate[f]
        }
    }

    pub fn is_stationary(&self) -> bool {
        !self.per_frame
    }
}

fn amp_to_db(magnitude: f32) -> f32 {
    20.0 * magnitude.max(MIN_MAGNITUDE).log10()
}

/// Forward then backward EWMA along time for every bin (zero phase)
fn smooth_over_time(values: &mut [f32], n_frames: usize, n_bins: usize, alpha: f32) {
    let alpha = alpha.clamp(0.0, 1.0);
    // Seed with the mean of roughly one time constant of frames, so the
    // first estimate is not a single noisy frame
    let warmup = if alpha > 0.0 {
        ((1.0 / alpha).ceil() as usize).clamp(1, n_frames)
    } else {
        n_frames
    };

    for f in 0..n_bins {
        let seed: f32 =
            (0..warmup).map(|t| values[t * n_bins + f]).sum::<f32>() / warmup as f32;

        let mut state = seed;
        for t in 0..n_frames {
            let idx = t * n_bins + f;
            state += alpha * (values[idx] - state);
            values[idx] = state;
        }

        for t in (0..n_frames).rev() {
            let idx = t * n_bins + f;
            state += alpha * (values[idx] - state);
            values[idx] = state;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stationary_gate_constant_bin() {
        // Constant magnitude: std is zero, gate equals the level
        let mags = vec![0.5f32; 10 * 4];
        let profile = NoiseProfile::stationary(&mags, 10, 4, 1.5);
        assert!(profile.is_stationary());
        for f in 0..4 {
            assert!((profile.gate(3, f) - 0.5).abs() < 1e-4);
        }
    }

    #[test]
    fn test_stationary_gate_rises_with_spread() {
        let n_frames = 20;
        let steady: Vec<f32> = vec![1.0; n_frames];
        let jumpy: Vec<f32> = (0..n_frames).map(|t| if t % 2 == 0 { 0.5 } else { 2.0 }).collect();
        let mut mags = Vec::new();
        for t in 0..n_frames {
            mags.push(steady[t]);
            mags.push(jumpy[t]);
        }
        let profile = NoiseProfile::stationary(&mags, n_frames, 2, 1.5);
        // Same geometric mean, but the spread pushes the jumpy gate higher
        assert!(profile.gate(0, 1) > profile.gate(0, 0) * 1.5);
    }

    #[test]
    fn test_non_stationary_follows_level_change() {
        let n_frames = 400;
        let n_bins = 8;
        let mut mags = vec![0.0f32; n_frames * n_bins];
        for t in 0..n_frames {
            let level = if t < n_frames / 2 { 0.1 } else { 1.0 };
            for f in 0..n_bins {
                mags[t * n_bins + f] = level;
            }
        }

        let profile = NoiseProfile::non_stationary(&mags, n_frames, n_bins, 0.05, 2, 1.0);
        assert!(!profile.is_stationary());
        assert!((profile.gate(10, 3) - 0.1).abs() < 0.02);
        assert!((profile.gate(n_frames - 10, 3) - 1.0).abs() < 0.05);
    }

    #[test]
    fn test_non_stationary_floor_ignores_narrow_peak() {
        let n_frames = 50;
        let n_bins = 32;
        let mut mags = vec![0.2f32; n_frames * n_bins];
        for t in 0..n_frames {
            mags[t * n_bins + 16] = 50.0;
        }

        let profile = NoiseProfile::non_stationary(&mags, n_frames, n_bins, 0.1, 4, 2.0);
        // A steady tone does not raise its own gate
        assert!((profile.gate(25, 16) - 0.4).abs() < 1e-3);
        assert!(mags[25 * n_bins + 16] > profile.gate(25, 16));
    }

    #[test]
    fn test_silence_gives_zero_gate() {
        let mags = vec![0.0f32; 30 * 5];
        let profile = NoiseProfile::non_stationary(&mags, 30, 5, 0.1, 2, 2.0);
        assert_eq!(profile.gate(0, 0), 0.0);
    }
}
