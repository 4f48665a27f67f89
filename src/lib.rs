//! voice-scrub: background noise removal for spoken audio
//!
//! Takes a video or audio file, pulls out a mono track, removes background
//! noise with spectral gating while keeping speech, re-encodes the result and
//! renders before/after spectrograms annotated with frequency zones.

pub mod audio_clean;
pub mod codec;
pub mod config;
pub mod error;
pub mod extract;
pub mod normalize;
pub mod pipeline;
pub mod spectrogram;

pub use config::ScrubConfig;
pub use error::{Result, ScrubError, Stage};
pub use pipeline::{Scrubber, ScrubOutput};
