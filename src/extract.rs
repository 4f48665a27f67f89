//! Audio extraction from video containers
//!
//! Demuxing is delegated to an external tool behind the [`Demuxer`] trait so
//! the pipeline can be driven by a mock in tests.

use std::ffi::OsString;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::codec::{mix_to_mono, MediaSource, PcmBuffer};
use crate::error::{Result, ScrubError};

/// File extensions routed through the demuxer instead of the decoder
pub const VIDEO_EXTENSIONS: &[&str] = &["mov", "mp4", "avi", "mkv", "m4v", "webm"];

pub fn is_video_extension(ext: &str) -> bool {
    VIDEO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
}

/// Pulls the audio track out of a video resource as integer PCM
pub trait Demuxer: Send + Sync {
    fn extract(&self, source: &MediaSource) -> Result<PcmBuffer>;
}

/// Runs `ffmpeg` as a subprocess, reading raw s16le PCM from its stdout
#[derive(Debug, Clone)]
pub struct FfmpegDemuxer {
    pub ffmpeg_path: PathBuf,
    pub sample_rate: u32,
    pub channels: u16,
    pub timeout: Duration,
}

impl Default for FfmpegDemuxer {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            sample_rate: 44100,
            channels: 1,
            timeout: Duration::from_secs(300),
        }
    }
}

/// Number of stderr lines kept in error messages
const STDERR_TAIL_LINES: usize = 5;
const POLL_INTERVAL: Duration = Duration::from_millis(20);

impl FfmpegDemuxer {
    /// Whether the configured ffmpeg binary runs at all
    pub fn is_available(&self) -> bool {
        Command::new(&self.ffmpeg_path)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn build_command(&self, input: OsString, from_stdin: bool) -> Command {
        let mut cmd = Command::new(&self.ffmpeg_path);
        if !from_stdin {
            cmd.arg("-nostdin");
        }
        cmd.args(["-hide_banner", "-loglevel", "error", "-i"])
            .arg(input)
            .args(["-vn", "-acodec", "pcm_s16le", "-ar"])
            .arg(self.sample_rate.to_string())
            .arg("-ac")
            .arg(self.channels.max(1).to_string())
            .args(["-f", "s16le", "pipe:1"])
            .stdin(if from_stdin { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("; ")
}

fn join_reader(handle: thread::JoinHandle<std::io::Result<Vec<u8>>>, name: &str) -> Result<Vec<u8>> {
    handle
        .join()
        .map_err(|_| ScrubError::Extraction(format!("{} reader thread panicked", name)))?
        .map_err(|e| ScrubError::Extraction(format!("Failed to read ffmpeg {}: {}", name, e)))
}

impl Demuxer for FfmpegDemuxer {
    fn extract(&self, source: &MediaSource) -> Result<PcmBuffer> {
        let (input, stdin_data) = match source {
            MediaSource::Path(path) => (path.as_os_str().to_owned(), None),
            MediaSource::Bytes { data, .. } => (OsString::from("pipe:0"), Some(data.clone())),
        };

        log::info!(
            "Extracting audio from {} with {:?} ({}Hz, {} ch)",
            source.describe(),
            self.ffmpeg_path,
            self.sample_rate,
            self.channels
        );

        let mut child = self
            .build_command(input, stdin_data.is_some())
            .spawn()
            .map_err(|e| {
                ScrubError::Extraction(format!(
                    "Failed to run {:?} (is ffmpeg installed?): {}",
                    self.ffmpeg_path, e
                ))
            })?;

        let writer = match (stdin_data, child.stdin.take()) {
            (Some(data), Some(mut stdin)) => Some(thread::spawn(move || {
                // ffmpeg may stop reading early; a broken pipe here is not the real error
                if let Err(e) = stdin.write_all(&data) {
                    log::debug!("ffmpeg stdin closed early: {}", e);
                }
            })),
            _ => None,
        };

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| ScrubError::Extraction("ffmpeg stdout unavailable".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| ScrubError::Extraction("ffmpeg stderr unavailable".to_string()))?;

        let stdout_reader = thread::spawn(move || {
            let mut buf = Vec::new();
            stdout.read_to_end(&mut buf).map(|_| buf)
        });
        let stderr_reader = thread::spawn(move || {
            let mut buf = Vec::new();
            stderr.read_to_end(&mut buf).map(|_| buf)
        });

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break Some(status),
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    break None;
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    let _ = child.kill();
                    return Err(ScrubError::Extraction(format!("Failed to wait for ffmpeg: {}", e)));
                }
            }
        };

        if let Some(writer) = writer {
            let _ = writer.join();
        }
        let raw = join_reader(stdout_reader, "stdout")?;
        let err_output = join_reader(stderr_reader, "stderr")?;

        let status = status.ok_or_else(|| {
            ScrubError::Extraction(format!(
                "ffmpeg timed out after {}s",
                self.timeout.as_secs_f32()
            ))
        })?;

        if !status.success() {
            return Err(ScrubError::Extraction(format!(
                "ffmpeg exited with {}: {}",
                status,
                stderr_tail(&err_output)
            )));
        }

        if raw.len() < 2 {
            return Err(ScrubError::Extraction(format!(
                "ffmpeg produced no audio (does the input have an audio track?) {}",
                stderr_tail(&err_output)
            )));
        }

        let interleaved: Vec<i16> = raw
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        let mut samples = Vec::with_capacity(interleaved.len() / self.channels.max(1) as usize);
        mix_to_mono(&interleaved, self.channels.max(1) as usize, &mut samples);

        log::info!(
            "Extracted {} samples ({:.2}s) of audio",
            samples.len(),
            samples.len() as f64 / self.sample_rate.max(1) as f64
        );

        Ok(PcmBuffer {
            samples,
            bit_depth: 16,
            sample_rate: self.sample_rate,
        })
    }
}
