use std::collections::HashMap;
use std::f32::consts::PI;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::io::AudioClip;

/// Level reached at the end of an exponential decay. Exponential ramps cannot
/// reach zero.
const DECAY_FLOOR: f32 = 0.01;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    Sine,
    Triangle,
    Square,
}

impl Waveform {
    /// Value at `phase` in cycles, range [-1, 1].
    fn value(self, phase: f32) -> f32 {
        let p = phase.fract();
        match self {
            Waveform::Sine => (2.0 * PI * p).sin(),
            Waveform::Triangle => 1.0 - 4.0 * (p - 0.5).abs(),
            Waveform::Square => {
                if p < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ramp {
    Linear,
    Exponential,
}

/// Target level reached at `time` seconds after the sound starts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EnvelopePoint {
    pub time: f64,
    pub level: f32,
    pub ramp: Ramp,
}

/// Piecewise amplitude envelope starting from silence at time zero.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    points: Vec<EnvelopePoint>,
}

impl Envelope {
    pub fn new(mut points: Vec<EnvelopePoint>) -> Self {
        points.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self { points }
    }

    /// Linear attack to full level, exponential decay to the floor.
    pub fn percussive(attack: f64, length: f64) -> Self {
        Self::new(vec![
            EnvelopePoint {
                time: attack,
                level: 1.0,
                ramp: Ramp::Linear,
            },
            EnvelopePoint {
                time: length,
                level: DECAY_FLOOR,
                ramp: Ramp::Exponential,
            },
        ])
    }

    /// Short attack, fast fall to a sustain shelf, then release over `length`.
    pub fn pluck(length: f64) -> Self {
        Self::new(vec![
            EnvelopePoint {
                time: 0.005,
                level: 1.0,
                ramp: Ramp::Linear,
            },
            EnvelopePoint {
                time: length * 0.3,
                level: 0.25,
                ramp: Ramp::Exponential,
            },
            EnvelopePoint {
                time: length,
                level: DECAY_FLOOR / 0.4,
                ramp: Ramp::Exponential,
            },
        ])
    }

    pub fn duration(&self) -> f64 {
        self.points.last().map(|p| p.time).unwrap_or(0.0)
    }

    pub fn level_at(&self, t: f64) -> f32 {
        let mut prev_time = 0.0;
        let mut prev_level = 0.0f32;
        for point in &self.points {
            if t <= point.time {
                let span = point.time - prev_time;
                if span <= 0.0 {
                    return point.level;
                }
                let x = ((t - prev_time) / span).clamp(0.0, 1.0) as f32;
                return match point.ramp {
                    Ramp::Linear => prev_level + (point.level - prev_level) * x,
                    Ramp::Exponential => {
                        let start = prev_level.max(1e-4);
                        let end = point.level.max(1e-4);
                        start * (end / start).powf(x)
                    }
                };
            }
            prev_time = point.time;
            prev_level = point.level;
        }
        0.0
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum VoiceSource {
    Oscillator {
        waveform: Waveform,
        frequency: f32,
        /// One-pole low-pass cutoff.
        lowpass_hz: Option<f32>,
    },
    /// A loaded clip; renders as the pattern tone when the clip is missing.
    Sample { name: String },
}

/// A sound to emit: source, envelope and volume.
#[derive(Clone, Debug, PartialEq)]
pub struct Voice {
    pub label: &'static str,
    pub source: VoiceSource,
    pub envelope: Envelope,
    pub volume: f32,
}

impl Voice {
    pub fn click(frequency: f32, volume: f32) -> Self {
        Self {
            label: "click",
            source: VoiceSource::Oscillator {
                waveform: Waveform::Sine,
                frequency,
                lowpass_hz: None,
            },
            envelope: Envelope::percussive(0.001, 0.05),
            volume,
        }
    }

    /// Filtered triangle used for pattern onsets.
    pub fn pattern_tone(frequency: f32, length: f64, volume: f32) -> Self {
        Self {
            label: "pattern",
            source: VoiceSource::Oscillator {
                waveform: Waveform::Triangle,
                frequency,
                lowpass_hz: Some(frequency * 2.0),
            },
            envelope: Envelope::pluck(length),
            volume,
        }
    }

    pub fn sample(name: impl Into<String>, length: f64, volume: f32) -> Self {
        Self {
            label: "sample",
            source: VoiceSource::Sample { name: name.into() },
            envelope: Envelope::pluck(length),
            volume,
        }
    }

    pub fn tap(volume: f32) -> Self {
        Self {
            label: "tap",
            ..Self::click(2_000.0, volume)
        }
    }
}

/// Renders voices into mono buffers. Holds only loaded clips.
#[derive(Debug, Default)]
pub struct Synthesizer {
    sample_rate: u32,
    clips: HashMap<String, AudioClip>,
}

impl Synthesizer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            clips: HashMap::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
    }

    pub fn load_clip(&mut self, name: impl Into<String>, clip: AudioClip) {
        let name = name.into();
        debug!(%name, frames = clip.samples.len(), "sample loaded");
        self.clips.insert(name, clip);
    }

    pub fn has_clip(&self, name: &str) -> bool {
        self.clips.contains_key(name)
    }

    pub fn clear_clips(&mut self) {
        self.clips.clear();
    }

    pub fn render(&self, voice: &Voice) -> Vec<f32> {
        match &voice.source {
            VoiceSource::Oscillator {
                waveform,
                frequency,
                lowpass_hz,
            } => self.render_oscillator(*waveform, *frequency, *lowpass_hz, voice),
            VoiceSource::Sample { name } => match self.clips.get(name) {
                Some(clip) => self.render_clip(clip, voice.volume),
                None => {
                    warn!(%name, "sample not loaded, using synthetic tone");
                    let fallback = Voice::pattern_tone(600.0, voice.envelope.duration(), voice.volume);
                    self.render(&fallback)
                }
            },
        }
    }

    fn render_oscillator(
        &self,
        waveform: Waveform,
        frequency: f32,
        lowpass_hz: Option<f32>,
        voice: &Voice,
    ) -> Vec<f32> {
        let rate = self.sample_rate.max(1) as f32;
        let frames = (voice.envelope.duration() * rate as f64).round() as usize;
        let alpha = lowpass_hz.map(|cutoff| {
            let dt = 1.0 / rate;
            let rc = 1.0 / (2.0 * PI * cutoff);
            dt / (rc + dt)
        });
        let mut filtered = 0.0f32;
        (0..frames)
            .map(|i| {
                let t = i as f32 / rate;
                let mut value = waveform.value(frequency * t);
                if let Some(alpha) = alpha {
                    filtered += alpha * (value - filtered);
                    value = filtered;
                }
                value * voice.envelope.level_at(t as f64) * voice.volume
            })
            .collect()
    }

    /// Linear-interpolated resample to the engine rate.
    fn render_clip(&self, clip: &AudioClip, volume: f32) -> Vec<f32> {
        if clip.samples.is_empty() || clip.sample_rate == 0 {
            return Vec::new();
        }
        let ratio = clip.sample_rate as f64 / self.sample_rate.max(1) as f64;
        let frames = (clip.samples.len() as f64 / ratio).floor() as usize;
        let last = clip.samples.len() - 1;
        (0..frames)
            .map(|i| {
                let pos = i as f64 * ratio;
                let idx = (pos.floor() as usize).min(last);
                let next = (idx + 1).min(last);
                let frac = (pos - idx as f64) as f32;
                let a = clip.samples[idx];
                let b = clip.samples[next];
                (a + (b - a) * frac) * volume
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn percussive_envelope_shape() {
        let env = Envelope::percussive(0.001, 0.05);
        assert_eq!(env.level_at(0.0), 0.0);
        assert_relative_eq!(env.level_at(0.0005), 0.5, epsilon = 1e-5);
        assert_relative_eq!(env.level_at(0.001), 1.0, epsilon = 1e-5);
        assert_relative_eq!(env.level_at(0.05), DECAY_FLOOR, epsilon = 1e-5);
        assert!(env.level_at(0.02) < 1.0 && env.level_at(0.02) > DECAY_FLOOR);
        assert_eq!(env.level_at(0.2), 0.0);
    }

    #[test]
    fn click_renders_expected_length_and_peak() {
        let synth = Synthesizer::new(48_000);
        let buffer = synth.render(&Voice::click(1_000.0, 0.3));
        assert_eq!(buffer.len(), 2_400);
        let peak = buffer.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak <= 0.3 + 1e-6);
        assert!(peak > 0.1);
    }

    #[test]
    fn missing_sample_falls_back_to_tone() {
        let synth = Synthesizer::new(8_000);
        let buffer = synth.render(&Voice::sample("piano", 0.1, 0.5));
        assert_eq!(buffer.len(), 800);
        assert!(buffer.iter().any(|s| s.abs() > 0.0));
    }

    #[test]
    fn clip_is_resampled() {
        let mut synth = Synthesizer::new(8_000);
        synth.load_clip("tick", AudioClip::new(16_000, vec![1.0; 1_600]));
        assert!(synth.has_clip("tick"));
        let buffer = synth.render(&Voice::sample("tick", 0.1, 0.5));
        assert_eq!(buffer.len(), 800);
        assert_relative_eq!(buffer[10], 0.5);
    }
}
