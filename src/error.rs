//! Error taxonomy for the scrub pipeline
//!
//! Every variant names the stage that failed so callers can tell
//! "could not read input" apart from "noise reduction failed".

use std::fmt;

/// Pipeline stage a failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extraction,
    Decode,
    Normalize,
    NoiseReduction,
    Encode,
    Render,
    Config,
    Output,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Extraction => "extraction",
            Stage::Decode => "decode",
            Stage::Normalize => "normalize",
            Stage::NoiseReduction => "noise reduction",
            Stage::Encode => "encode",
            Stage::Render => "render",
            Stage::Config => "config",
            Stage::Output => "output",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScrubError {
    #[error("Could not extract audio from video: {0}")]
    Extraction(String),
    #[error("Could not read input, unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("Could not read input: {0}")]
    Decode(String),
    #[error("Unsupported bit depth: {0} bits (expected 16 or 32)")]
    UnsupportedBitDepth(u16),
    #[error("Noise reduction failed, invalid signal: {0}")]
    InvalidSignal(String),
    #[error("Could not encode output: {0}")]
    Encode(String),
    #[error("Could not render spectrogram: {0}")]
    Render(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScrubError {
    pub fn stage(&self) -> Stage {
        match self {
            ScrubError::Extraction(_) => Stage::Extraction,
            ScrubError::UnsupportedFormat(_) | ScrubError::Decode(_) => Stage::Decode,
            ScrubError::UnsupportedBitDepth(_) => Stage::Normalize,
            ScrubError::InvalidSignal(_) => Stage::NoiseReduction,
            ScrubError::Encode(_) => Stage::Encode,
            ScrubError::Render(_) => Stage::Render,
            ScrubError::Config(_) => Stage::Config,
            ScrubError::Io(_) => Stage::Output,
        }
    }
}

impl From<realfft::FftError> for ScrubError {
    fn from(e: realfft::FftError) -> Self {
        ScrubError::InvalidSignal(format!("FFT error: {}", e))
    }
}

pub type Result<T> = std::result::Result<T, ScrubError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_stage() {
        let read = ScrubError::Decode("truncated header".into()).to_string();
        let reduce = ScrubError::InvalidSignal("too short".into()).to_string();
        assert!(read.contains("Could not read input"));
        assert!(reduce.contains("Noise reduction failed"));
        assert_ne!(read, reduce);
    }

    #[test]
    fn test_stage_mapping() {
        assert_eq!(ScrubError::Extraction("x".into()).stage(), Stage::Extraction);
        assert_eq!(ScrubError::UnsupportedFormat("x".into()).stage(), Stage::Decode);
        assert_eq!(ScrubError::UnsupportedBitDepth(8).stage(), Stage::Normalize);
        assert_eq!(ScrubError::Encode("x".into()).stage(), Stage::Encode);
        assert_eq!(Stage::NoiseReduction.to_string(), "noise reduction");
    }
}
