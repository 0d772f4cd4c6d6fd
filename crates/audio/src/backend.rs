use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AudioError;
use crate::mixer::{Mixer, RenderedSound};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub buffer_size: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
            buffer_size: 512,
        }
    }
}

/// Output device seam. Only the engine talks to a backend.
pub trait AudioBackend {
    /// Acquires or resumes the output. Returns the sample rate in use.
    fn resume(&mut self, config: &StreamConfig) -> Result<u32, AudioError>;
    fn suspend(&mut self) {}
    fn submit(&mut self, sound: RenderedSound) -> Result<(), AudioError>;
    fn close(&mut self);
}

/// Backend with no output. Submitted sounds are dropped once the stream is
/// open.
#[derive(Debug, Default)]
pub struct NullBackend {
    open: bool,
}

impl AudioBackend for NullBackend {
    fn resume(&mut self, config: &StreamConfig) -> Result<u32, AudioError> {
        debug!(?config, "opening null audio stream");
        self.open = true;
        Ok(config.sample_rate)
    }

    fn suspend(&mut self) {
        self.open = false;
    }

    fn submit(&mut self, _sound: RenderedSound) -> Result<(), AudioError> {
        if self.open {
            Ok(())
        } else {
            Err(AudioError::NotReady)
        }
    }

    fn close(&mut self) {
        self.open = false;
    }
}

/// What an offline backend was asked to play.
#[derive(Clone, Debug, PartialEq)]
pub struct SoundRecord {
    pub label: &'static str,
    pub start_time: f64,
    pub frames: usize,
    /// Largest sample magnitude.
    pub peak: f32,
}

/// Shared view of everything submitted to an [`OfflineBackend`].
#[derive(Clone, Debug, Default)]
pub struct SoundLog {
    records: Arc<Mutex<Vec<SoundRecord>>>,
}

impl SoundLog {
    fn push(&self, record: SoundRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record);
        }
    }

    pub fn records(&self) -> Vec<SoundRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, label: &str) -> usize {
        self.records().iter().filter(|r| r.label == label).count()
    }

    pub fn clear(&self) {
        if let Ok(mut records) = self.records.lock() {
            records.clear();
        }
    }
}

/// Device-free backend that mixes into memory.
pub struct OfflineBackend {
    available: bool,
    mixer: Option<Mixer>,
    channels: usize,
    log: SoundLog,
}

impl OfflineBackend {
    pub fn new() -> Self {
        Self {
            available: true,
            mixer: None,
            channels: 1,
            log: SoundLog::default(),
        }
    }

    /// A backend whose output can never be acquired.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    pub fn log(&self) -> SoundLog {
        self.log.clone()
    }

    /// Renders the next `frames` frames of interleaved output.
    pub fn render(&mut self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames * self.channels];
        if let Some(mixer) = self.mixer.as_mut() {
            mixer.render(&mut out, self.channels);
        }
        out
    }
}

impl Default for OfflineBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for OfflineBackend {
    fn resume(&mut self, config: &StreamConfig) -> Result<u32, AudioError> {
        if !self.available {
            return Err(AudioError::Unavailable("offline output disabled".into()));
        }
        debug!(?config, "opening offline audio stream");
        self.channels = config.channels.max(1) as usize;
        if self.mixer.is_none() {
            self.mixer = Some(Mixer::new(config.sample_rate));
        }
        Ok(config.sample_rate)
    }

    fn submit(&mut self, sound: RenderedSound) -> Result<(), AudioError> {
        let mixer = self.mixer.as_mut().ok_or(AudioError::NotReady)?;
        self.log.push(SoundRecord {
            label: sound.label,
            start_time: sound.start_time,
            frames: sound.samples.len(),
            peak: sound.samples.iter().fold(0.0f32, |m, s| m.max(s.abs())),
        });
        mixer.add(sound);
        Ok(())
    }

    fn close(&mut self) {
        self.mixer = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_backend_records_and_mixes() {
        let mut backend = OfflineBackend::new();
        let config = StreamConfig {
            sample_rate: 100,
            channels: 1,
            ..Default::default()
        };
        assert_eq!(backend.resume(&config).unwrap(), 100);
        backend
            .submit(RenderedSound {
                label: "click",
                start_time: 0.0,
                samples: vec![0.5; 4].into(),
            })
            .unwrap();
        let log = backend.log();
        assert_eq!(log.count("click"), 1);
        let out = backend.render(4);
        assert_eq!(out, vec![0.5; 4]);
    }

    #[test]
    fn null_backend_drops_sounds_once_open() {
        let mut backend = NullBackend::default();
        let sound = || RenderedSound {
            label: "click",
            start_time: 0.0,
            samples: vec![0.1].into(),
        };
        assert!(matches!(backend.submit(sound()), Err(AudioError::NotReady)));
        let config = StreamConfig {
            sample_rate: 44_100,
            ..Default::default()
        };
        assert_eq!(backend.resume(&config).unwrap(), 44_100);
        backend.submit(sound()).unwrap();
        backend.suspend();
        assert!(backend.submit(sound()).is_err());
    }

    #[test]
    fn submit_before_resume_fails() {
        let mut backend = OfflineBackend::new();
        let sound = RenderedSound {
            label: "click",
            start_time: 0.0,
            samples: vec![0.1].into(),
        };
        assert!(matches!(backend.submit(sound), Err(AudioError::NotReady)));
        assert!(OfflineBackend::unavailable()
            .resume(&StreamConfig::default())
            .is_err());
    }
}
