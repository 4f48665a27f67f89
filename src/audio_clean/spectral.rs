//! Spectral gating noise reduction
//!
//! Estimates a noise floor per frequency bin, builds a soft keep/suppress
//! mask from it, smooths the mask and resynthesizes the attenuated spectrum
//! with overlap-add. Output length always equals input length.

use serde::{Deserialize, Serialize};

use super::mask::{apply_mask, gate_mask, smooth_mask};
use super::noise_profile::NoiseProfile;
use super::stft::Stft;
use crate::codec::AudioBuffer;
use crate::error::{Result, ScrubError};

const MAX_FRAME_MS: f32 = 1000.0;
const MAX_SMOOTH_HZ: f32 = 24_000.0;
const MAX_SMOOTH_MS: f32 = 10_000.0;

/// How the noise floor is estimated
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum NoiseMode {
    /// One floor per bin from whole-signal statistics
    Stationary,
    /// Rolling floor that follows noise drifting over time
    NonStationary,
}

/// Noise reduction parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ReductionOptions {
    pub mode: NoiseMode,
    /// Fraction of suppression applied to gated bins (0-1)
    pub prop_decrease: f32,
    /// Stationary: std multiplier over the mean dB level.
    /// Non-stationary: multiplier over the rolling floor.
    /// Mode default when absent.
    pub threshold: Option<f32>,
    /// Rolling statistic time constant in seconds (non-stationary)
    pub time_constant_s: f32,
    /// Analysis frame length in ms, rounded to the nearest power of two
    pub frame_ms: f32,
    /// Frequency neighbourhood for the rolling floor median
    pub floor_bandwidth_hz: f32,
    /// Steepness of the soft mask transition
    pub sigmoid_slope: f32,
    pub freq_smooth_hz: f32,
    pub time_smooth_ms: f32,
}

impl Default for ReductionOptions {
    fn default() -> Self {
        Self {
            mode: NoiseMode::NonStationary,
            prop_decrease: 0.9,
            threshold: None,
            time_constant_s: 2.0,
            frame_ms: 40.0,
            floor_bandwidth_hz: 1000.0,
            sigmoid_slope: 20.0,
            freq_smooth_hz: 50.0,
            time_smooth_ms: 50.0,
        }
    }
}

impl ReductionOptions {
    pub fn effective_threshold(&self) -> f32 {
        self.threshold.unwrap_or(match self.mode {
            NoiseMode::Stationary => 1.5,
            NoiseMode::NonStationary => 2.0,
        })
    }

    pub fn validate(&self) -> Result<()> {
        let check = |ok: bool, msg: &str| {
            if ok {
                Ok(())
            } else {
                Err(ScrubError::Config(msg.to_string()))
            }
        };

        check(
            (0.0..=1.0).contains(&self.prop_decrease),
            "propDecrease must be between 0 and 1",
        )?;
        check(
            self.threshold.map_or(true, |t| t.is_finite() && t >= 0.0),
            "threshold must be a non-negative number",
        )?;
        check(
            self.time_constant_s > 0.0 && self.time_constant_s.is_finite(),
            "timeConstantS must be a positive number",
        )?;
        check(
            self.frame_ms > 0.0 && self.frame_ms <= MAX_FRAME_MS,
            "frameMs must be between 0 and 1000",
        )?;
        check(
            self.floor_bandwidth_hz >= 0.0 && self.floor_bandwidth_hz.is_finite(),
            "floorBandwidthHz must be a non-negative number",
        )?;
        check(
            self.sigmoid_slope > 0.0 && self.sigmoid_slope.is_finite(),
            "sigmoidSlope must be a positive number",
        )?;
        check(
            (0.0..=MAX_SMOOTH_HZ).contains(&self.freq_smooth_hz),
            "freqSmoothHz must be between 0 and 24000",
        )?;
        check(
            (0.0..=MAX_SMOOTH_MS).contains(&self.time_smooth_ms),
            "timeSmoothMs must be between 0 and 10000",
        )
    }
}

/// Spectral gate bound to one sample rate
pub struct SpectralGate {
    options: ReductionOptions,
    sample_rate: u32,
    stft: Stft,
}

impl SpectralGate {
    pub fn new(sample_rate: u32, options: &ReductionOptions) -> Result<Self> {
        if sample_rate == 0 {
            return Err(ScrubError::InvalidSignal("sample rate is zero".to_string()));
        }
        options.validate()?;

        let fft_size = frame_length(sample_rate, options.frame_ms);
        let stft = Stft::new(fft_size, fft_size / 2)?;

        Ok(Self {
            options: options.clone(),
            sample_rate,
            stft,
        })
    }

    pub fn fft_size(&self) -> usize {
        self.stft.fft_size()
    }

    /// Denoise a mono signal; the result has the same length
    pub fn process(&self, samples: &[f32]) -> Result<Vec<f32>> {
        let fft_size = self.stft.fft_size();
        if samples.len() < fft_size {
            return Err(ScrubError::InvalidSignal(format!(
                "signal has {} samples, at least one frame of {} is required",
                samples.len(),
                fft_size
            )));
        }

        let opts = &self.options;
        let hop = self.stft.hop_size();
        let n_bins = self.stft.n_bins();
        let bin_hz = self.sample_rate as f32 / fft_size as f32;
        let hop_ms = hop as f32 * 1000.0 / self.sample_rate as f32;

        let mut spectrum = self.stft.analyze(samples)?;
        let n_frames = spectrum.n_frames;
        let magnitudes = spectrum.magnitudes();

        let threshold = opts.effective_threshold();
        let profile = match opts.mode {
            NoiseMode::Stationary => {
                NoiseProfile::stationary(&magnitudes, n_frames, n_bins, threshold)
            }
            NoiseMode::NonStationary => {
                let hop_s = hop as f32 / self.sample_rate as f32;
                let alpha = 1.0 - (-hop_s / opts.time_constant_s).exp();
                let floor_half_width =
                    ((opts.floor_bandwidth_hz / bin_hz).round() as usize).min(n_bins);
                NoiseProfile::non_stationary(
                    &magnitudes,
                    n_frames,
                    n_bins,
                    alpha,
                    floor_half_width,
                    threshold,
                )
            }
        };

        let mut mask = gate_mask(&magnitudes, &profile, n_frames, n_bins, opts.sigmoid_slope);
        let freq_half_width = ((opts.freq_smooth_hz / bin_hz).round() as usize).min(n_bins);
        let time_half_width = ((opts.time_smooth_ms / hop_ms).round() as usize).min(n_frames);
        smooth_mask(&mut mask, n_frames, n_bins, freq_half_width, time_half_width);

        log::debug!(
            "Spectral gate: fft={} hop={} frames={} threshold={:.2} smoothing={}x{} bins",
            fft_size,
            hop,
            n_frames,
            threshold,
            freq_half_width,
            time_half_width
        );

        apply_mask(&mut spectrum, &mask, opts.prop_decrease);
        self.stft.synthesize(&spectrum, samples.len())
    }
}

/// Power-of-two frame length nearest to `frame_ms` at `sample_rate`
fn frame_length(sample_rate: u32, frame_ms: f32) -> usize {
    let target = (sample_rate as f32 * frame_ms / 1000.0).max(4.0);
    let upper = (target.ceil() as usize).next_power_of_two();
    let lower = (upper / 2).max(4);
    if target - lower as f32 <= upper as f32 - target {
        lower
    } else {
        upper
    }
}

/// Remove background noise from a mono buffer
pub fn reduce_noise(buffer: AudioBuffer, options: &ReductionOptions) -> Result<AudioBuffer> {
    if buffer.is_empty() {
        return Err(ScrubError::InvalidSignal("signal is empty".to_string()));
    }

    let gate = SpectralGate::new(buffer.sample_rate, options)?;
    let samples = gate.process(&buffer.samples)?;

    log::info!(
        "Noise reduction ({:?}, prop_decrease={:.2}): {} samples at {}Hz",
        options.mode,
        options.prop_decrease,
        samples.len(),
        buffer.sample_rate
    );

    Ok(AudioBuffer {
        samples,
        ..buffer
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::f64::consts::PI;

    const SR: u32 = 44100;

    fn white_noise(len: usize, amplitude: f32, seed: u64) -> Vec<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..len).map(|_| rng.gen_range(-amplitude..amplitude)).collect()
    }

    fn energy(samples: &[f32]) -> f64 {
        samples.iter().map(|&s| (s as f64) * (s as f64)).sum()
    }

    /// Energy in STFT bins below `max_hz`
    fn band_energy(samples: &[f32], max_hz: f32) -> f64 {
        let stft = Stft::new(2048, 1024).unwrap();
        let spectrum = stft.analyze(samples).unwrap();
        let bin_hz = SR as f32 / 2048.0;
        let mut total = 0.0;
        for t in 0..spectrum.n_frames {
            for (f, bin) in spectrum.frame(t).iter().enumerate() {
                if (f as f32) * bin_hz < max_hz {
                    total += bin.norm_sqr() as f64;
                }
            }
        }
        total
    }

    /// Amplitude of the `freq` component over `range`
    fn tone_magnitude(samples: &[f32], freq: f64, range: std::ops::Range<usize>) -> f64 {
        let (mut re, mut im) = (0.0f64, 0.0f64);
        for n in range.clone() {
            let phase = 2.0 * PI * freq * n as f64 / SR as f64;
            re += samples[n] as f64 * phase.cos();
            im -= samples[n] as f64 * phase.sin();
        }
        2.0 * (re * re + im * im).sqrt() / range.len() as f64
    }

    #[test]
    fn test_frame_length_rounds_to_power_of_two() {
        assert_eq!(frame_length(44100, 40.0), 2048);
        assert_eq!(frame_length(16000, 40.0), 512);
        assert_eq!(frame_length(48000, 40.0), 2048);
        assert_eq!(frame_length(8000, 40.0), 256);
    }

    #[test]
    fn test_default_options() {
        let opts = ReductionOptions::default();
        assert_eq!(opts.mode, NoiseMode::NonStationary);
        assert_eq!(opts.effective_threshold(), 2.0);
        let stationary = ReductionOptions {
            mode: NoiseMode::Stationary,
            ..opts
        };
        assert_eq!(stationary.effective_threshold(), 1.5);
        assert!(stationary.validate().is_ok());
    }

    #[test]
    fn test_invalid_options_rejected() {
        let opts = ReductionOptions {
            prop_decrease: 1.5,
            ..Default::default()
        };
        assert!(matches!(opts.validate(), Err(ScrubError::Config(_))));
    }

    #[test]
    fn test_out_of_range_widths_rejected() {
        let cases = [
            ReductionOptions { freq_smooth_hz: f32::MAX, ..Default::default() },
            ReductionOptions { time_smooth_ms: f32::INFINITY, ..Default::default() },
            ReductionOptions { freq_smooth_hz: f32::NAN, ..Default::default() },
            ReductionOptions { frame_ms: 5000.0, ..Default::default() },
            ReductionOptions { floor_bandwidth_hz: f32::INFINITY, ..Default::default() },
            ReductionOptions { time_constant_s: f32::INFINITY, ..Default::default() },
        ];
        for opts in cases {
            assert!(
                matches!(opts.validate(), Err(ScrubError::Config(_))),
                "{:?} should be rejected",
                opts
            );
            let result = reduce_noise(AudioBuffer::mono(white_noise(4096, 0.2, 3), SR), &opts);
            assert!(matches!(result, Err(ScrubError::Config(_))));
        }
    }

    #[test]
    fn test_widest_smoothing_runs() {
        // Kernels wider than the grid are clipped to it
        let opts = ReductionOptions {
            freq_smooth_hz: 24_000.0,
            time_smooth_ms: 10_000.0,
            floor_bandwidth_hz: 1.0e9,
            ..Default::default()
        };
        assert!(opts.validate().is_ok());
        let noise = white_noise(SR as usize / 2, 0.2, 8);
        let out = reduce_noise(AudioBuffer::mono(noise.clone(), SR), &opts).unwrap();
        assert_eq!(out.len(), noise.len());
        assert!(out.samples.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_tone_in_white_noise() {
        let len = SR as usize * 5;
        let noise = white_noise(len, 0.1, 7);
        let input: Vec<f32> = (0..len)
            .map(|n| {
                let tone = (2.0 * PI * 1000.0 * n as f64 / SR as f64).sin() as f32 * 0.5;
                tone + noise[n]
            })
            .collect();

        let out = reduce_noise(
            AudioBuffer::mono(input.clone(), SR),
            &ReductionOptions::default(),
        )
        .unwrap();

        assert_eq!(out.len(), input.len());
        assert_eq!(out.sample_rate, SR);

        let low_in = band_energy(&input, 100.0);
        let low_out = band_energy(&out.samples, 100.0);
        assert!(
            low_out <= 0.5 * low_in,
            "0-100 Hz energy only dropped from {:.3} to {:.3}",
            low_in,
            low_out
        );

        let middle = SR as usize..4 * SR as usize;
        let tone_in = tone_magnitude(&input, 1000.0, middle.clone());
        let tone_out = tone_magnitude(&out.samples, 1000.0, middle);
        assert!(
            tone_out >= 0.9 * tone_in,
            "tone dropped from {:.4} to {:.4}",
            tone_in,
            tone_out
        );
    }

    #[test]
    fn test_stationary_mode_reduces_noise() {
        let noise = white_noise(SR as usize * 2, 0.1, 11);
        let opts = ReductionOptions {
            mode: NoiseMode::Stationary,
            ..Default::default()
        };
        let out = reduce_noise(AudioBuffer::mono(noise.clone(), SR), &opts).unwrap();
        assert_eq!(out.len(), noise.len());
        assert!(energy(&out.samples) < 0.5 * energy(&noise));
    }

    #[test]
    fn test_silence_stays_silent() {
        for mode in [NoiseMode::Stationary, NoiseMode::NonStationary] {
            let opts = ReductionOptions {
                mode,
                ..Default::default()
            };
            let out = reduce_noise(AudioBuffer::mono(vec![0.0; 10_000], SR), &opts).unwrap();
            assert_eq!(out.len(), 10_000);
            assert!(out.samples.iter().all(|&s| s == 0.0));
        }
    }

    #[test]
    fn test_more_suppression_never_adds_energy() {
        let noise = white_noise(SR as usize, 0.2, 3);
        let run = |prop_decrease: f32| {
            let opts = ReductionOptions {
                prop_decrease,
                ..Default::default()
            };
            reduce_noise(AudioBuffer::mono(noise.clone(), SR), &opts).unwrap()
        };

        let light = energy(&run(0.5).samples);
        let heavy = energy(&run(0.95).samples);
        let none = energy(&run(0.0).samples);
        assert!(heavy <= light);
        assert!(light <= none);
    }

    #[test]
    fn test_zero_prop_decrease_is_transparent() {
        let noise = white_noise(8192, 0.3, 5);
        let opts = ReductionOptions {
            prop_decrease: 0.0,
            ..Default::default()
        };
        let out = reduce_noise(AudioBuffer::mono(noise.clone(), SR), &opts).unwrap();
        for (a, b) in noise.iter().zip(&out.samples) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn test_deterministic() {
        let noise = white_noise(20_000, 0.2, 42);
        let opts = ReductionOptions::default();
        let a = reduce_noise(AudioBuffer::mono(noise.clone(), SR), &opts).unwrap();
        let b = reduce_noise(AudioBuffer::mono(noise, SR), &opts).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_short_and_empty_inputs_rejected() {
        let opts = ReductionOptions::default();
        for len in [0usize, 1, 2047] {
            let result = reduce_noise(AudioBuffer::mono(vec![0.1; len], SR), &opts);
            assert!(
                matches!(result, Err(ScrubError::InvalidSignal(_))),
                "len {} should be rejected",
                len
            );
        }
        // Exactly one frame is enough
        assert!(reduce_noise(AudioBuffer::mono(vec![0.1; 2048], SR), &opts).is_ok());
    }

    #[test]
    fn test_zero_sample_rate_rejected() {
        let result = reduce_noise(
            AudioBuffer::mono(vec![0.1; 4096], 0),
            &ReductionOptions::default(),
        );
        assert!(matches!(result, Err(ScrubError::InvalidSignal(_))));
    }
}
