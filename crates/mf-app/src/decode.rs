//! Audio file decoding to a mono f32 signal.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Decode the first audio track of `path`, averaging channels to mono.
///
/// Returns the samples and the track's sample rate.
///
/// # Errors
/// Returns an error if the file cannot be opened, has no decodable track or
/// declares no sample rate.
pub fn decode_mono(path: &Path) -> Result<(Vec<f32>, u32)> {
    let file = File::open(path).with_context(|| format!("Impossible d'ouvrir {}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .context("Format audio non reconnu")?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .context("Aucune piste audio décodable")?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .context("Fréquence d'échantillonnage inconnue")?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Codec non supporté")?;

    let mut mono = Vec::new();
    let mut interleaved: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e).context("Lecture du flux audio"),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("Paquet corrompu ignoré: {e}");
                continue;
            }
            Err(e) => return Err(e).context("Décodage audio"),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count().max(1);
        if interleaved
            .as_ref()
            .is_none_or(|buf| buf.capacity() < decoded.capacity() * channels)
        {
            interleaved = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
        }
        let Some(buf) = interleaved.as_mut() else {
            continue;
        };
        buf.copy_interleaved_ref(decoded);

        mono.extend(
            buf.samples()
                .chunks_exact(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32),
        );
    }

    log::info!(
        "Decoded {}: {} samples at {} Hz",
        path.display(),
        mono.len(),
        sample_rate
    );
    Ok((mono, sample_rate))
}
