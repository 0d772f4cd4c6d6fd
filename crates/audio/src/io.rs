use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, instrument};

/// Mono clip held in memory for playback.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub sample_rate: u32,
    pub samples: Arc<[f32]>,
}

impl AudioClip {
    pub fn new(sample_rate: u32, samples: Vec<f32>) -> Self {
        Self {
            sample_rate,
            samples: samples.into(),
        }
    }

    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

pub struct SampleDecoder;

impl SampleDecoder {
    /// Decodes a file into a peak-normalized mono clip.
    #[instrument]
    pub fn open<P: AsRef<Path> + std::fmt::Debug>(path: P) -> Result<AudioClip> {
        let path_ref = path.as_ref();
        let file =
            File::open(path_ref).with_context(|| format!("open audio file {:?}", path_ref))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());
        let mut hint = Hint::new();
        if let Some(ext) = path_ref.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(ext);
        }

        let detected = symphonia::default::get_probe().format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;
        let mut format = detected.format;
        let track = format
            .default_track()
            .ok_or_else(|| anyhow::anyhow!("no default track found"))?;
        let track_id = track.id;
        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())?;
        let sample_rate = track.codec_params.sample_rate.unwrap_or(48_000);

        let mut mono = Vec::new();
        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    break;
                }
                Err(err) => return Err(err.into()),
            };
            if packet.track_id() != track_id {
                continue;
            }
            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                // skip undecodable packet
                Err(SymphError::DecodeError(_)) => continue,
                Err(err) => return Err(err.into()),
            };
            let spec = *decoded.spec();
            let channels = spec.channels.count().max(1);
            let mut interleaved = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            interleaved.copy_interleaved_ref(decoded);
            downmix_into(interleaved.samples(), channels, &mut mono);
        }

        normalize_peak(&mut mono);
        debug!(frames = mono.len(), sample_rate, "decoded sample");
        Ok(AudioClip::new(sample_rate, mono))
    }
}

/// Averages interleaved frames down to one channel.
pub fn downmix_into(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    let channels = channels.max(1);
    out.extend(
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32),
    );
}

/// Scales the buffer so its largest magnitude is 1. Returns the original peak.
pub fn normalize_peak(buffer: &mut [f32]) -> f32 {
    let peak = buffer.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    let gain = peak.max(1e-6);
    for sample in buffer.iter_mut() {
        *sample /= gain;
    }
    peak
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoder_handles_missing_file() {
        let result = SampleDecoder::open("does-not-exist.wav");
        assert!(result.is_err());
    }

    #[test]
    fn downmix_averages_channels() {
        let mut out = Vec::new();
        downmix_into(&[1.0, 0.0, 0.5, 0.5], 2, &mut out);
        assert_eq!(out, vec![0.5, 0.5]);
    }

    #[test]
    fn normalize_scales_to_unity() {
        let mut buffer = vec![0.5, -1.0, 0.75];
        let peak = normalize_peak(&mut buffer);
        assert!((peak - 1.0).abs() < 1e-6);
        assert!(buffer.iter().all(|s| s.abs() <= 1.0));
        let clip = AudioClip::new(4, buffer);
        assert_eq!(clip.duration(), 0.75);
    }
}
