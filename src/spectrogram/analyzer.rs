//! Power spectrogram in dB relative to a full-scale sinusoid

use crate::audio_clean::stft::Stft;
use crate::codec::AudioBuffer;
use crate::error::{Result, ScrubError};

const MIN_WINDOW: usize = 16;
const MAX_WINDOW: usize = 65_536;

#[derive(Debug, Clone, PartialEq)]
pub struct SpectrogramOptions {
    pub window: usize,
    /// Defaults to `window / 2`
    pub hop: Option<usize>,
    pub db_floor: f32,
    pub db_ceiling: f32,
}

impl Default for SpectrogramOptions {
    fn default() -> Self {
        Self {
            window: 2048,
            hop: None,
            db_floor: -80.0,
            db_ceiling: 0.0,
        }
    }
}

impl SpectrogramOptions {
    pub fn hop_size(&self) -> usize {
        self.hop.unwrap_or(self.window / 2)
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_WINDOW..=MAX_WINDOW).contains(&self.window) {
            return Err(ScrubError::Config(format!(
                "spectrogram window {} out of range ({}-{})",
                self.window, MIN_WINDOW, MAX_WINDOW
            )));
        }
        let hop = self.hop_size();
        if hop == 0 || hop > self.window {
            return Err(ScrubError::Config(format!(
                "spectrogram hop {} must be between 1 and the window size {}",
                hop, self.window
            )));
        }
        if !(self.db_floor < self.db_ceiling) {
            return Err(ScrubError::Config(format!(
                "dB floor {} must be below dB ceiling {}",
                self.db_floor, self.db_ceiling
            )));
        }
        Ok(())
    }
}

/// Clamped dB grid, time-major (`n_frames` rows of `n_bins`)
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrogramFrame {
    pub power_db: Vec<f32>,
    pub n_frames: usize,
    pub n_bins: usize,
    pub sample_rate: u32,
    pub window: usize,
    pub hop: usize,
    pub db_floor: f32,
    pub db_ceiling: f32,
}

impl SpectrogramFrame {
    #[inline]
    pub fn value(&self, t: usize, f: usize) -> f32 {
        self.power_db[t * self.n_bins + f]
    }

    pub fn nyquist(&self) -> f32 {
        self.sample_rate as f32 / 2.0
    }

    /// Centre frequency of every bin in Hz
    pub fn freq_axis(&self) -> Vec<f32> {
        let bin_hz = self.sample_rate as f32 / self.window as f32;
        (0..self.n_bins).map(|f| f as f32 * bin_hz).collect()
    }

    /// Centre time of every frame in seconds
    pub fn time_axis(&self) -> Vec<f32> {
        (0..self.n_frames)
            .map(|t| (t * self.hop) as f32 / self.sample_rate as f32)
            .collect()
    }
}

/// Compute the spectrogram of a mono buffer
///
/// The buffer is peak-normalized first so the plot shows relative level.
/// A full-scale sine lands at 0 dB; silence lands on the floor.
pub fn analyze(buffer: &AudioBuffer, options: &SpectrogramOptions) -> Result<SpectrogramFrame> {
    if buffer.is_empty() {
        return Err(ScrubError::InvalidSignal("cannot analyze an empty signal".to_string()));
    }
    if buffer.sample_rate == 0 {
        return Err(ScrubError::InvalidSignal("sample rate is zero".to_string()));
    }
    options.validate()?;

    let peak = buffer.peak();
    let scale = if peak > 0.0 { 1.0 / peak } else { 0.0 };
    let normalized: Vec<f32> = buffer.samples.iter().map(|s| s * scale).collect();

    let hop = options.hop_size();
    let stft = Stft::new(options.window, hop)?;
    let spectrum = stft.analyze(&normalized)?;

    // A unit sine peaks at |X| = sum(w) / 2 in its bin
    let window_sum: f32 = stft.window().iter().sum();
    let reference = (window_sum / 2.0).powi(2);

    let power_db = spectrum
        .bins
        .iter()
        .map(|c| {
            let power = c.norm_sqr() / reference;
            let db = if power > 0.0 {
                10.0 * power.log10()
            } else {
                options.db_floor
            };
            db.clamp(options.db_floor, options.db_ceiling)
        })
        .collect();

    Ok(SpectrogramFrame {
        power_db,
        n_frames: spectrum.n_frames,
        n_bins: spectrum.n_bins,
        sample_rate: buffer.sample_rate,
        window: options.window,
        hop,
        db_floor: options.db_floor,
        db_ceiling: options.db_ceiling,
    })
}
