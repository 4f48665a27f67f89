//! Spectral noise reduction
//!
//! Removes background noise while keeping speech:
//! 1. STFT analysis (Hann window, half-frame hop)
//! 2. Noise floor estimate, stationary or rolling non-stationary
//! 3. Soft sigmoid mask, smoothed over time and frequency
//! 4. Masked resynthesis with overlap-add

pub mod mask;
pub mod noise_profile;
pub mod spectral;
pub mod stft;

pub use spectral::{reduce_noise, NoiseMode, ReductionOptions, SpectralGate};
