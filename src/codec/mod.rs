//! Sample codec adapter
//!
//! Decodes container/compressed audio into mono PCM and encodes PCM back into
//! a delivery format:
//! 1. Decode via symphonia (any supported container), collapsed to mono
//! 2. Encode to WAV (hound), MP3 (LAME) or OGG Vorbis
//! 3. Optional sinc resampling (rubato)

pub mod decode;
pub mod encode;
pub mod resample;

use std::path::{Path, PathBuf};

pub use decode::decode;
pub use encode::{encode, OutputFormat};
pub use resample::resample;

/// A readable media resource: a file on disk or an in-memory byte stream
#[derive(Debug, Clone)]
pub enum MediaSource {
    Path(PathBuf),
    Bytes {
        data: Vec<u8>,
        /// File extension used as a probe hint (e.g. "wav", "mp4")
        extension: Option<String>,
    },
}

impl MediaSource {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        MediaSource::Path(path.into())
    }

    pub fn from_bytes(data: Vec<u8>, extension: Option<&str>) -> Self {
        MediaSource::Bytes {
            data,
            extension: extension.map(|e| e.to_ascii_lowercase()),
        }
    }

    /// Lowercased extension, if known
    pub fn extension(&self) -> Option<String> {
        match self {
            MediaSource::Path(path) => path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase()),
            MediaSource::Bytes { extension, .. } => extension.clone(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            MediaSource::Path(path) => Some(path),
            MediaSource::Bytes { .. } => None,
        }
    }

    /// Short human-readable description for log lines
    pub fn describe(&self) -> String {
        match self {
            MediaSource::Path(path) => path.display().to_string(),
            MediaSource::Bytes { data, extension } => format!(
                "<{} bytes{}>",
                data.len(),
                extension.as_deref().map(|e| format!(", .{}", e)).unwrap_or_default()
            ),
        }
    }
}

/// Mono integer PCM as produced by a decoder or demuxer
///
/// `bit_depth` is the sample width the values are scaled to (16 or 32);
/// the normalizer picks its scale factor from it.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    pub samples: Vec<i32>,
    pub bit_depth: u16,
    pub sample_rate: u32,
}

impl PcmBuffer {
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Mono float signal in the canonical [-1.0, 1.0] domain
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioBuffer {
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            channels: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
    }
}

/// Average interleaved frames down to a single channel
pub(crate) fn mix_to_mono<T>(interleaved: &[T], channels: usize, out: &mut Vec<i32>)
where
    T: Copy + Into<i64>,
{
    if channels <= 1 {
        out.extend(interleaved.iter().map(|&s| s.into() as i32));
        return;
    }

    for frame in interleaved.chunks_exact(channels) {
        let sum: i64 = frame.iter().map(|&s| s.into()).sum();
        out.push((sum / channels as i64) as i32);
    }
}
