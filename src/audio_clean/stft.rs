//! Short-time Fourier transform with overlap-add resynthesis
//!
//! Frames are centred: the signal is padded with `fft_size / 2` zeros on the
//! left so frame `t` is centred on sample `t * hop_size`. Resynthesis uses the
//! same Hann window and normalizes by the summed squared window, so an
//! unmodified spectrum reconstructs the input exactly (up to float error).

use std::sync::Arc;

use realfft::num_complex::Complex32;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

use crate::error::{Result, ScrubError};

/// Time-major grid of complex bins: `n_frames` rows of `n_bins`
#[derive(Debug, Clone)]
pub struct Spectrum {
    pub bins: Vec<Complex32>,
    pub n_frames: usize,
    pub n_bins: usize,
}

impl Spectrum {
    pub fn frame(&self, t: usize) -> &[Complex32] {
        &self.bins[t * self.n_bins..(t + 1) * self.n_bins]
    }

    pub fn frame_mut(&mut self, t: usize) -> &mut [Complex32] {
        &mut self.bins[t * self.n_bins..(t + 1) * self.n_bins]
    }

    /// Magnitudes in the same time-major layout
    pub fn magnitudes(&self) -> Vec<f32> {
        self.bins.iter().map(|c| c.norm()).collect()
    }
}

pub struct Stft {
    fft_size: usize,
    hop_size: usize,
    window: Vec<f32>,
    forward_fft: Arc<dyn RealToComplex<f32>>,
    inverse_fft: Arc<dyn ComplexToReal<f32>>,
}

impl Stft {
    pub fn new(fft_size: usize, hop_size: usize) -> Result<Self> {
        if fft_size < 2 || hop_size == 0 || hop_size > fft_size {
            return Err(ScrubError::InvalidSignal(format!(
                "Invalid STFT geometry: fft_size={}, hop_size={}",
                fft_size, hop_size
            )));
        }

        let mut planner = RealFftPlanner::<f32>::new();
        let forward_fft = planner.plan_fft_forward(fft_size);
        let inverse_fft = planner.plan_fft_inverse(fft_size);

        // Periodic Hann window
        let window: Vec<f32> = (0..fft_size)
            .map(|i| {
                0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / fft_size as f32).cos())
            })
            .collect();

        Ok(Self {
            fft_size,
            hop_size,
            window,
            forward_fft,
            inverse_fft,
        })
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    pub fn n_bins(&self) -> usize {
        self.fft_size / 2 + 1
    }

    pub fn window(&self) -> &[f32] {
        &self.window
    }

    /// Number of centred frames needed to cover `len` samples
    ///
    /// One frame past the last sample so the tail is overlapped as fully as
    /// the head.
    pub fn frame_count(&self, len: usize) -> usize {
        (len + self.fft_size / 2) / self.hop_size + 1
    }

    /// Forward transform of the whole signal
    pub fn analyze(&self, samples: &[f32]) -> Result<Spectrum> {
        let n_frames = self.frame_count(samples.len());
        let n_bins = self.n_bins();
        let half = self.fft_size / 2;

        let mut bins = Vec::with_capacity(n_frames * n_bins);
        let mut buffer = self.forward_fft.make_input_vec();
        let mut spectrum = self.forward_fft.make_output_vec();

        for t in 0..n_frames {
            // Frame start in signal coordinates (may be negative at the left edge)
            let start = (t * self.hop_size) as isize - half as isize;
            for (i, slot) in buffer.iter_mut().enumerate() {
                let idx = start + i as isize;
                let sample = if idx >= 0 && (idx as usize) < samples.len() {
                    samples[idx as usize]
                } else {
                    0.0
                };
                *slot = sample * self.window[i];
            }

            self.forward_fft.process(&mut buffer, &mut spectrum)?;
            bins.extend_from_slice(&spectrum);
        }

        Ok(Spectrum {
            bins,
            n_frames,
            n_bins,
        })
    }

    /// Inverse transform with windowed overlap-add, trimmed to `len` samples
    pub fn synthesize(&self, spectrum: &Spectrum, len: usize) -> Result<Vec<f32>> {
        let half = self.fft_size / 2;
        let padded_len = (spectrum.n_frames.saturating_sub(1)) * self.hop_size + self.fft_size;

        let mut output = vec![0.0f32; padded_len];
        let mut window_sum = vec![0.0f32; padded_len];

        let mut frame_spec = self.inverse_fft.make_input_vec();
        let mut time_buffer = self.inverse_fft.make_output_vec();
        let norm = 1.0 / self.fft_size as f32;

        for t in 0..spectrum.n_frames {
            frame_spec.copy_from_slice(spectrum.frame(t));
            // DC and Nyquist must be purely real for the inverse real FFT
            if let Some(first) = frame_spec.first_mut() {
                first.im = 0.0;
            }
            if let Some(last) = frame_spec.last_mut() {
                last.im = 0.0;
            }

            self.inverse_fft.process(&mut frame_spec, &mut time_buffer)?;

            let pos = t * self.hop_size;
            for (i, sample) in time_buffer.iter().enumerate() {
                output[pos + i] += sample * norm * self.window[i];
                window_sum[pos + i] += self.window[i] * self.window[i];
            }
        }

        // Drop the centring pad and normalize by the window overlap
        let signal: Vec<f32> = (0..len)
            .map(|i| {
                let idx = i + half;
                if idx < padded_len && window_sum[idx] > 1e-6 {
                    output[idx] / window_sum[idx]
                } else {
                    0.0
                }
            })
            .collect();

        Ok(signal)
    }
}
