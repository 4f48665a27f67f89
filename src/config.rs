//! Run configuration (`voice-scrub.json`)
//!
//! Every section has defaults, so a config file only needs the values it
//! changes. Keys are camelCase.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::audio_clean::ReductionOptions;
use crate::codec::OutputFormat;
use crate::error::{Result, ScrubError};
use crate::extract::FfmpegDemuxer;
use crate::spectrogram::{default_zones, FrequencyZone, RenderOptions, SpectrogramOptions};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ScrubConfig {
    pub reduction: ReductionOptions,
    pub extraction: ExtractionConfig,
    pub output: OutputConfig,
    pub spectrogram: SpectrogramConfig,
}

/// Video demuxing and input sample rate handling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractionConfig {
    pub ffmpeg_path: PathBuf,
    pub target_sample_rate: u32,
    pub channels: u16,
    pub timeout_secs: u64,
    /// Resample decoded audio inputs to `target_sample_rate` as well
    pub resample_audio_inputs: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            target_sample_rate: 44100,
            channels: 1,
            timeout_secs: 300,
            resample_audio_inputs: false,
        }
    }
}

impl ExtractionConfig {
    pub fn demuxer(&self) -> FfmpegDemuxer {
        FfmpegDemuxer {
            ffmpeg_path: self.ffmpeg_path.clone(),
            sample_rate: self.target_sample_rate,
            channels: self.channels,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct OutputConfig {
    /// mp3, wav or ogg
    pub format: String,
    pub mp3_bitrate_kbps: u32,
    /// Vorbis VBR quality (-0.1 to 1.0)
    pub ogg_quality: f32,
    /// Peak-normalize the cleaned audio before encoding
    pub normalize: bool,
    pub normalize_target_dbfs: f32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: "mp3".to_string(),
            mp3_bitrate_kbps: 192,
            ogg_quality: 0.6,
            normalize: false,
            normalize_target_dbfs: -0.1,
        }
    }
}

impl OutputConfig {
    pub fn output_format(&self) -> Result<OutputFormat> {
        Ok(match self.format.parse::<OutputFormat>()? {
            OutputFormat::Mp3 { .. } => OutputFormat::Mp3 {
                bitrate_kbps: self.mp3_bitrate_kbps,
            },
            OutputFormat::Ogg { .. } => OutputFormat::Ogg {
                quality: self.ogg_quality,
            },
            OutputFormat::Wav => OutputFormat::Wav,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SpectrogramConfig {
    pub enabled: bool,
    pub window: usize,
    pub hop: Option<usize>,
    pub db_floor: f32,
    pub db_ceiling: f32,
    pub width: u32,
    pub height: u32,
    pub zone_alpha: f32,
    pub zones: Vec<FrequencyZone>,
}

impl Default for SpectrogramConfig {
    fn default() -> Self {
        let analysis = SpectrogramOptions::default();
        let render = RenderOptions::default();
        Self {
            enabled: true,
            window: analysis.window,
            hop: analysis.hop,
            db_floor: analysis.db_floor,
            db_ceiling: analysis.db_ceiling,
            width: render.width,
            height: render.height,
            zone_alpha: render.zone_alpha,
            zones: default_zones(),
        }
    }
}

impl SpectrogramConfig {
    pub fn analysis_options(&self) -> SpectrogramOptions {
        SpectrogramOptions {
            window: self.window,
            hop: self.hop,
            db_floor: self.db_floor,
            db_ceiling: self.db_ceiling,
        }
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            width: self.width,
            height: self.height,
            zone_alpha: self.zone_alpha,
        }
    }
}

impl ScrubConfig {
    /// Load and validate a JSON config file
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).map_err(|e| {
            ScrubError::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        let config = Self::from_json(&json)?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ScrubError::Config(format!("Invalid config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ScrubError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Range checks that do not depend on the input signal
    ///
    /// Zone coverage is checked against the actual Nyquist frequency at
    /// render time.
    pub fn validate(&self) -> Result<()> {
        self.reduction.validate()?;

        let ex = &self.extraction;
        if !(8000..=192_000).contains(&ex.target_sample_rate) {
            return Err(ScrubError::Config(format!(
                "targetSampleRate {} out of range (8000-192000)",
                ex.target_sample_rate
            )));
        }
        if ex.channels == 0 {
            return Err(ScrubError::Config("channels must be at least 1".to_string()));
        }
        if ex.timeout_secs == 0 {
            return Err(ScrubError::Config("timeoutSecs must be positive".to_string()));
        }

        self.output
            .output_format()
            .map_err(|e| ScrubError::Config(e.to_string()))?;
        if !(-0.1..=1.0).contains(&self.output.ogg_quality) {
            return Err(ScrubError::Config(format!(
                "oggQuality {} out of range (-0.1 to 1.0)",
                self.output.ogg_quality
            )));
        }
        if self.output.normalize_target_dbfs > 0.0 {
            return Err(ScrubError::Config(
                "normalizeTargetDbfs must not be above 0 dBFS".to_string(),
            ));
        }

        let sg = &self.spectrogram;
        sg.analysis_options().validate()?;
        if sg.width == 0 || sg.height == 0 {
            return Err(ScrubError::Config("spectrogram width and height must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&sg.zone_alpha) {
            return Err(ScrubError::Config("zoneAlpha must be between 0 and 1".to_string()));
        }
        if sg.zones.is_empty() {
            return Err(ScrubError::Config("at least one frequency zone is required".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_clean::NoiseMode;

    #[test]
    fn test_defaults_are_valid() {
        let config = ScrubConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.reduction.prop_decrease, 0.9);
        assert_eq!(config.extraction.target_sample_rate, 44100);
        assert!(!config.output.normalize);
        assert_eq!(
            config.output.output_format().unwrap(),
            OutputFormat::Mp3 { bitrate_kbps: 192 }
        );
        assert_eq!(config.spectrogram.zones.len(), 4);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = ScrubConfig::from_json(
            r#"{
                "reduction": { "mode": "stationary", "propDecrease": 0.5 },
                "output": { "format": "ogg", "oggQuality": 0.3 }
            }"#,
        )
        .unwrap();

        assert_eq!(config.reduction.mode, NoiseMode::Stationary);
        assert_eq!(config.reduction.prop_decrease, 0.5);
        assert_eq!(config.reduction.time_constant_s, 2.0);
        assert_eq!(config.output.output_format().unwrap(), OutputFormat::Ogg { quality: 0.3 });
        assert!(config.spectrogram.enabled);
    }

    #[test]
    fn test_round_trip_through_json() {
        let config = ScrubConfig::default();
        let json = config.to_json_pretty().unwrap();
        assert!(json.contains("propDecrease"));
        assert!(json.contains("nonStationary"));
        assert_eq!(ScrubConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let cases = [
            r#"{"reduction": {"propDecrease": 2.0}}"#,
            r#"{"output": {"format": "flac"}}"#,
            r#"{"extraction": {"targetSampleRate": 100}}"#,
            r#"{"spectrogram": {"dbFloor": 10, "dbCeiling": 0}}"#,
            r#"{"spectrogram": {"zones": []}}"#,
            r#"{"spectrogram": {"window": 1048576}}"#,
            r#"{"reduction": {"freqSmoothHz": 1e30}}"#,
            r#"{"reduction": {"timeSmoothMs": 1e30}}"#,
            r#"{"reduction": {"frameMs": 60000}}"#,
            r#"{"reduction": "#,
        ];
        for json in cases {
            assert!(
                matches!(ScrubConfig::from_json(json), Err(ScrubError::Config(_))),
                "accepted {}",
                json
            );
        }
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voice-scrub.json");
        fs::write(&path, r#"{"output": {"format": "wav"}}"#).unwrap();
        let config = ScrubConfig::load(&path).unwrap();
        assert_eq!(config.output.output_format().unwrap(), OutputFormat::Wav);

        assert!(matches!(
            ScrubConfig::load(&dir.path().join("missing.json")),
            Err(ScrubError::Config(_))
        ));
    }

    #[test]
    fn test_demuxer_from_config() {
        let demuxer = ExtractionConfig::default().demuxer();
        assert_eq!(demuxer.sample_rate, 44100);
        assert_eq!(demuxer.timeout, Duration::from_secs(300));
    }
}
