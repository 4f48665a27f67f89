//! End-to-end scrub: acquire -> normalize -> denoise -> encode -> visualize
//!
//! Stages run in order and the first failure aborts the run. Nothing is
//! written to disk until every artifact exists in memory.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;

use tempfile::NamedTempFile;

use crate::audio_clean::reduce_noise;
use crate::codec::{self, AudioBuffer, MediaSource, OutputFormat, PcmBuffer};
use crate::config::{ScrubConfig, SpectrogramConfig};
use crate::error::{Result, ScrubError};
use crate::extract::{is_video_extension, Demuxer};
use crate::normalize::{normalize_peak, to_float, to_int};
use crate::spectrogram::{analyze, render, visible_zones, VisualArtifact};

/// Bit depth of the delivered audio
const OUTPUT_BIT_DEPTH: u16 = 16;

/// Everything one run produces, held in memory
#[derive(Debug)]
pub struct ScrubOutput {
    pub audio: Vec<u8>,
    pub format: OutputFormat,
    pub sample_rate: u32,
    pub samples: usize,
    pub original_spectrogram: Option<VisualArtifact>,
    pub denoised_spectrogram: Option<VisualArtifact>,
}

/// Output file names for an input stem
pub fn output_names(stem: &str, format: OutputFormat) -> (String, String, String) {
    (
        format!("enhanced_{}.{}", stem, format.extension()),
        format!("{}_original.png", stem),
        format!("{}_denoised.png", stem),
    )
}

pub struct Scrubber {
    config: ScrubConfig,
    demuxer: Box<dyn Demuxer>,
}

impl Scrubber {
    /// Scrubber using ffmpeg for video inputs
    pub fn new(config: ScrubConfig) -> Result<Self> {
        let demuxer = Box::new(config.extraction.demuxer());
        Self::with_demuxer(config, demuxer)
    }

    pub fn with_demuxer(config: ScrubConfig, demuxer: Box<dyn Demuxer>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, demuxer })
    }

    pub fn config(&self) -> &ScrubConfig {
        &self.config
    }

    fn acquire(&self, source: &MediaSource) -> Result<(PcmBuffer, bool)> {
        let is_video = source
            .extension()
            .map(|ext| is_video_extension(&ext))
            .unwrap_or(false);

        if is_video {
            Ok((self.demuxer.extract(source)?, true))
        } else {
            Ok((codec::decode(source)?, false))
        }
    }

    /// Run every stage on `source` and return the artifacts
    pub fn process(&self, source: &MediaSource) -> Result<ScrubOutput> {
        let started = Instant::now();
        let config = &self.config;
        let format = config.output.output_format()?;

        let (pcm, demuxed) = self.acquire(source)?;
        log::info!(
            "Input {}: {} samples, {}-bit, {}Hz ({:.2}s)",
            source.describe(),
            pcm.samples.len(),
            pcm.bit_depth,
            pcm.sample_rate,
            pcm.duration()
        );

        let mut original = AudioBuffer::mono(to_float(&pcm.samples, pcm.bit_depth)?, pcm.sample_rate);
        drop(pcm);

        let target_rate = config.extraction.target_sample_rate;
        if !demuxed && config.extraction.resample_audio_inputs && original.sample_rate != target_rate {
            original = codec::resample(original, target_rate)?;
        }

        let denoised = reduce_noise(original.clone(), &config.reduction)?;

        let delivered = if config.output.normalize {
            normalize_peak(denoised.clone(), config.output.normalize_target_dbfs)
        } else {
            denoised.clone()
        };

        let out_pcm = PcmBuffer {
            samples: to_int(&delivered.samples, OUTPUT_BIT_DEPTH)?,
            bit_depth: OUTPUT_BIT_DEPTH,
            sample_rate: delivered.sample_rate,
        };
        let audio = codec::encode(&out_pcm, format)?;

        let (original_spectrogram, denoised_spectrogram) = if config.spectrogram.enabled {
            let (before, after) = spectrogram_pair(&original, &denoised, &config.spectrogram)?;
            (Some(before), Some(after))
        } else {
            (None, None)
        };

        log::info!(
            "Scrubbed {} in {:.2}s -> {} bytes of {}",
            source.describe(),
            started.elapsed().as_secs_f32(),
            audio.len(),
            format.extension()
        );

        Ok(ScrubOutput {
            audio,
            format,
            sample_rate: out_pcm.sample_rate,
            samples: out_pcm.samples.len(),
            original_spectrogram,
            denoised_spectrogram,
        })
    }

    /// Process `input` and write the results into `out_dir`
    ///
    /// Returns the written paths. If any write fails, nothing in `out_dir`
    /// changes.
    pub fn run_to_dir(&self, input: &Path, out_dir: &Path) -> Result<Vec<PathBuf>> {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());

        let output = self.process(&MediaSource::from_path(input))?;
        let (audio_name, original_name, denoised_name) = output_names(&stem, output.format);

        let mut files: Vec<(PathBuf, Vec<u8>)> = vec![(out_dir.join(audio_name), output.audio)];
        if let Some(artifact) = &output.original_spectrogram {
            files.push((out_dir.join(original_name), artifact.to_png()?));
        }
        if let Some(artifact) = &output.denoised_spectrogram {
            files.push((out_dir.join(denoised_name), artifact.to_png()?));
        }

        commit_files(out_dir, files)
    }
}

/// Stage every artifact in `out_dir`, then move them over their targets
///
/// On any failure `out_dir` is left as it was: staged files are discarded
/// and files replaced by this call are restored.
fn commit_files(out_dir: &Path, files: Vec<(PathBuf, Vec<u8>)>) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(out_dir)?;

    let mut staged = Vec::with_capacity(files.len());
    for (path, bytes) in files {
        let mut tmp = NamedTempFile::new_in(out_dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        staged.push((path, tmp));
    }

    let backups = tempfile::Builder::new()
        .prefix(".voice-scrub-")
        .tempdir_in(out_dir)?;
    let mut committed: Vec<(PathBuf, Option<PathBuf>)> = Vec::with_capacity(staged.len());

    for (i, (path, tmp)) in staged.into_iter().enumerate() {
        match move_into_place(&path, tmp, &backups.path().join(i.to_string())) {
            Ok(backup) => {
                log::info!("Wrote {}", path.display());
                committed.push((path, backup));
            }
            Err(e) => {
                log::warn!("Failed to write {}: {}", path.display(), e);
                roll_back(&committed);
                return Err(e);
            }
        }
    }

    Ok(committed.into_iter().map(|(path, _)| path).collect())
}

/// Persist `tmp` at `path`, moving an existing file at `path` to `backup`
fn move_into_place(path: &Path, tmp: NamedTempFile, backup: &Path) -> Result<Option<PathBuf>> {
    let backup = if path.is_file() {
        fs::rename(path, backup)?;
        Some(backup.to_path_buf())
    } else {
        None
    };

    if let Err(e) = tmp.persist(path) {
        if let Some(backup) = &backup {
            let _ = fs::rename(backup, path);
        }
        return Err(ScrubError::Io(e.error));
    }
    Ok(backup)
}

fn roll_back(committed: &[(PathBuf, Option<PathBuf>)]) {
    for (path, backup) in committed.iter().rev() {
        let _ = fs::remove_file(path);
        if let Some(backup) = backup {
            if let Err(e) = fs::rename(backup, path) {
                log::warn!("Could not restore {}: {}", path.display(), e);
            }
        }
    }
}

fn spectrogram_for(buffer: &AudioBuffer, config: &SpectrogramConfig) -> Result<VisualArtifact> {
    let zones = visible_zones(&config.zones, buffer.sample_rate as f32 / 2.0);
    let frame = analyze(buffer, &config.analysis_options())?;
    render(&frame, &zones, &config.render_options())
}

/// Before/after spectrograms on two threads with identical settings
fn spectrogram_pair(
    original: &AudioBuffer,
    denoised: &AudioBuffer,
    config: &SpectrogramConfig,
) -> Result<(VisualArtifact, VisualArtifact)> {
    thread::scope(|s| {
        let before = s.spawn(|| spectrogram_for(original, config));
        let after = s.spawn(|| spectrogram_for(denoised, config));

        let before = join_artifact(before);
        let after = join_artifact(after);
        Ok((before?, after?))
    })
}

fn join_artifact(handle: thread::ScopedJoinHandle<'_, Result<VisualArtifact>>) -> Result<VisualArtifact> {
    handle
        .join()
        .map_err(|_| ScrubError::Render("spectrogram thread panicked".to_string()))?
}
