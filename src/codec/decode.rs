//! Container/codec decoding into mono integer PCM

use std::fs::File;
use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::conv::ConvertibleSample;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::{MediaSource as SymphoniaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::{mix_to_mono, MediaSource, PcmBuffer};
use crate::error::{Result, ScrubError};

/// Decode a media resource into a mono PCM buffer
///
/// Sources declaring 16 bits per sample or fewer decode to 16-bit PCM;
/// everything else (24/32-bit PCM, lossy codecs) decodes to 32-bit PCM.
pub fn decode(source: &MediaSource) -> Result<PcmBuffer> {
    let media: Box<dyn SymphoniaSource> = match source {
        MediaSource::Path(path) => {
            let file = File::open(path)
                .map_err(|e| ScrubError::Decode(format!("Failed to open {}: {}", path.display(), e)))?;
            Box::new(file)
        }
        MediaSource::Bytes { data, .. } => Box::new(Cursor::new(data.clone())),
    };
    let mss = MediaSourceStream::new(media, Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = source.extension() {
        hint.with_extension(&ext);
    }

    let format_opts = FormatOptions::default();
    let metadata_opts = MetadataOptions::default();
    let decoder_opts = DecoderOptions::default();

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &format_opts, &metadata_opts)
        .map_err(|e| ScrubError::UnsupportedFormat(format!("Failed to probe format: {}", e)))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| ScrubError::Decode("No audio tracks found".to_string()))?;

    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| ScrubError::Decode("Audio track has no sample rate".to_string()))?;
    let declared_bits = track.codec_params.bits_per_sample;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &decoder_opts)
        .map_err(|e| ScrubError::UnsupportedFormat(format!("Failed to create decoder: {}", e)))?;

    let (samples, bit_depth) = match declared_bits {
        Some(bits) if bits <= 16 => (
            decode_packets::<i16>(format.as_mut(), decoder.as_mut(), track_id)?,
            16,
        ),
        _ => (
            decode_packets::<i32>(format.as_mut(), decoder.as_mut(), track_id)?,
            32,
        ),
    };

    log::info!(
        "Decoded {}: {} mono samples @ {}Hz, {}-bit",
        source.describe(),
        samples.len(),
        sample_rate,
        bit_depth
    );

    Ok(PcmBuffer {
        samples,
        bit_depth,
        sample_rate,
    })
}

fn decode_packets<S>(
    format: &mut dyn FormatReader,
    decoder: &mut dyn Decoder,
    track_id: u32,
) -> Result<Vec<i32>>
where
    S: ConvertibleSample + Into<i64>,
{
    let mut mono_samples: Vec<i32> = Vec::new();
    let mut skipped_packets = 0usize;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("Skipping unreadable packet: {}", e);
                skipped_packets += 1;
                continue;
            }
            Err(e) => return Err(ScrubError::Decode(format!("Error reading packet: {}", e))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("Skipping undecodable packet: {}", e);
                skipped_packets += 1;
                continue;
            }
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(e) => return Err(ScrubError::Decode(format!("Decode error: {}", e))),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count().max(1);
        let duration = decoded.capacity() as u64;

        let mut sample_buf = SampleBuffer::<S>::new(duration, spec);
        sample_buf.copy_interleaved_ref(decoded);

        mix_to_mono(sample_buf.samples(), channels, &mut mono_samples);
    }

    if skipped_packets > 0 {
        log::warn!("{} packets could not be decoded and were skipped", skipped_packets);
    }

    Ok(mono_samples)
}
