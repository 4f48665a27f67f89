//! PCM encoding into delivery formats

use std::io::Cursor;
use std::num::{NonZeroU32, NonZeroU8};
use std::str::FromStr;

use hound::{SampleFormat, WavSpec, WavWriter};
use mp3lame_encoder::{Builder, FlushNoGap, InterleavedPcm};
use vorbis_rs::{VorbisBitrateManagementStrategy, VorbisEncoderBuilder};

use super::PcmBuffer;
use crate::error::{Result, ScrubError};

/// Target delivery format
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Wav,
    Mp3 { bitrate_kbps: u32 },
    Ogg { quality: f32 },
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Wav => "wav",
            OutputFormat::Mp3 { .. } => "mp3",
            OutputFormat::Ogg { .. } => "ogg",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = ScrubError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "wav" => Ok(OutputFormat::Wav),
            "mp3" => Ok(OutputFormat::Mp3 { bitrate_kbps: 192 }),
            "ogg" => Ok(OutputFormat::Ogg { quality: 0.6 }),
            other => Err(ScrubError::Encode(format!(
                "Unsupported target format '{}' (use wav, mp3 or ogg)",
                other
            ))),
        }
    }
}

/// Encode a mono PCM buffer into the requested format
pub fn encode(pcm: &PcmBuffer, format: OutputFormat) -> Result<Vec<u8>> {
    if pcm.bit_depth != 16 && pcm.bit_depth != 32 {
        return Err(ScrubError::Encode(format!(
            "Cannot encode {}-bit samples",
            pcm.bit_depth
        )));
    }
    if pcm.sample_rate == 0 {
        return Err(ScrubError::Encode("Sample rate must be non-zero".to_string()));
    }

    let bytes = match format {
        OutputFormat::Wav => encode_wav(pcm)?,
        OutputFormat::Mp3 { bitrate_kbps } => encode_mp3(pcm, bitrate_kbps)?,
        OutputFormat::Ogg { quality } => encode_ogg(pcm, quality)?,
    };

    log::info!(
        "Encoded {} samples to {} ({} bytes)",
        pcm.samples.len(),
        format.extension(),
        bytes.len()
    );

    Ok(bytes)
}

fn encode_wav(pcm: &PcmBuffer) -> Result<Vec<u8>> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: pcm.sample_rate,
        bits_per_sample: pcm.bit_depth,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)
            .map_err(|e| ScrubError::Encode(format!("Failed to create WAV writer: {}", e)))?;

        for &sample in &pcm.samples {
            let written = if pcm.bit_depth == 16 {
                writer.write_sample(sample as i16)
            } else {
                writer.write_sample(sample)
            };
            written.map_err(|e| ScrubError::Encode(format!("Failed to write sample: {}", e)))?;
        }

        writer
            .finalize()
            .map_err(|e| ScrubError::Encode(format!("Failed to finalize WAV: {}", e)))?;
    }

    Ok(cursor.into_inner())
}

fn to_i16(sample: i32, bit_depth: u16) -> i16 {
    if bit_depth == 16 {
        sample.clamp(i16::MIN as i32, i16::MAX as i32) as i16
    } else {
        (sample >> 16) as i16
    }
}

fn encode_mp3(pcm: &PcmBuffer, bitrate_kbps: u32) -> Result<Vec<u8>> {
    // InterleavedPcm always expects stereo interleaved data, so mono is
    // duplicated to both channels to avoid double-speed encoding.
    let stereo: Vec<i16> = pcm
        .samples
        .iter()
        .flat_map(|&s| {
            let s = to_i16(s, pcm.bit_depth);
            [s, s]
        })
        .collect();

    let mut mp3_encoder = Builder::new()
        .ok_or_else(|| ScrubError::Encode("Failed to create MP3 encoder".to_string()))?;
    mp3_encoder
        .set_num_channels(2)
        .map_err(|e| ScrubError::Encode(format!("Failed to set channels: {:?}", e)))?;
    mp3_encoder
        .set_sample_rate(pcm.sample_rate)
        .map_err(|e| ScrubError::Encode(format!("Failed to set sample rate: {:?}", e)))?;
    mp3_encoder
        .set_brate(map_bitrate(bitrate_kbps))
        .map_err(|e| ScrubError::Encode(format!("Failed to set bitrate: {:?}", e)))?;
    mp3_encoder
        .set_quality(mp3lame_encoder::Quality::Best)
        .map_err(|e| ScrubError::Encode(format!("Failed to set quality: {:?}", e)))?;

    let mut mp3_encoder = mp3_encoder
        .build()
        .map_err(|e| ScrubError::Encode(format!("Failed to build encoder: {:?}", e)))?;

    // LAME needs roughly 1.25x input + 7200 bytes of output space
    let input = InterleavedPcm(&stereo);
    let estimated_size = (stereo.len() * 5 / 4) + 7200;
    let mut mp3_out: Vec<u8> = Vec::with_capacity(estimated_size);

    let encoded_size = mp3_encoder
        .encode(input, mp3_out.spare_capacity_mut())
        .map_err(|e| ScrubError::Encode(format!("Failed to encode MP3: {:?}", e)))?;
    unsafe {
        mp3_out.set_len(encoded_size);
    }

    mp3_out.reserve(7200);
    let flush_size = mp3_encoder
        .flush::<FlushNoGap>(mp3_out.spare_capacity_mut())
        .map_err(|e| ScrubError::Encode(format!("Failed to flush encoder: {:?}", e)))?;
    unsafe {
        mp3_out.set_len(mp3_out.len() + flush_size);
    }

    Ok(mp3_out)
}

fn map_bitrate(bitrate: u32) -> mp3lame_encoder::Bitrate {
    match bitrate {
        0..=32 => mp3lame_encoder::Bitrate::Kbps32,
        33..=40 => mp3lame_encoder::Bitrate::Kbps40,
        41..=48 => mp3lame_encoder::Bitrate::Kbps48,
        49..=64 => mp3lame_encoder::Bitrate::Kbps64,
        65..=80 => mp3lame_encoder::Bitrate::Kbps80,
        81..=96 => mp3lame_encoder::Bitrate::Kbps96,
        97..=112 => mp3lame_encoder::Bitrate::Kbps112,
        113..=128 => mp3lame_encoder::Bitrate::Kbps128,
        129..=160 => mp3lame_encoder::Bitrate::Kbps160,
        161..=192 => mp3lame_encoder::Bitrate::Kbps192,
        193..=224 => mp3lame_encoder::Bitrate::Kbps224,
        225..=256 => mp3lame_encoder::Bitrate::Kbps256,
        257..=320 => mp3lame_encoder::Bitrate::Kbps320,
        _ => mp3lame_encoder::Bitrate::Kbps192,
    }
}

const OGG_BLOCK_FRAMES: usize = 65536;

fn encode_ogg(pcm: &PcmBuffer, quality: f32) -> Result<Vec<u8>> {
    let sr = NonZeroU32::new(pcm.sample_rate)
        .ok_or_else(|| ScrubError::Encode("Sample rate must be non-zero".to_string()))?;
    let ch = NonZeroU8::new(1).ok_or_else(|| ScrubError::Encode("Channels must be non-zero".to_string()))?;

    let mut encoder = VorbisEncoderBuilder::new(sr, ch, Vec::new())
        .map_err(|e| ScrubError::Encode(format!("Vorbis builder error: {}", e)))?
        .bitrate_management_strategy(VorbisBitrateManagementStrategy::QualityVbr {
            target_quality: quality.clamp(-0.1, 1.0),
        })
        .build()
        .map_err(|e| ScrubError::Encode(format!("Vorbis build error: {}", e)))?;

    let scale = if pcm.bit_depth == 16 { 32768.0 } else { 2_147_483_648.0 };
    for chunk in pcm.samples.chunks(OGG_BLOCK_FRAMES) {
        let block: Vec<f32> = chunk
            .iter()
            .map(|&s| (s as f64 / scale).clamp(-1.0, 1.0) as f32)
            .collect();
        encoder
            .encode_audio_block([block])
            .map_err(|e| ScrubError::Encode(format!("Vorbis encode error: {}", e)))?;
    }

    encoder
        .finish()
        .map_err(|e| ScrubError::Encode(format!("Vorbis finish error: {}", e)))
}
