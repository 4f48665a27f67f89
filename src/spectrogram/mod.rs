//! Before/after spectrogram visualization
//!
//! `analyze` turns a mono buffer into a clamped dB grid, `render` draws it as
//! a greyscale image with perceptual frequency zones overlaid and a legend.

pub mod analyzer;
pub mod font;
pub mod render;
pub mod zones;

pub use analyzer::{analyze, SpectrogramFrame, SpectrogramOptions};
pub use render::{render, LegendEntry, RenderOptions, VisualArtifact};
pub use zones::{default_zones, validate_zones, visible_zones, FrequencyZone};
