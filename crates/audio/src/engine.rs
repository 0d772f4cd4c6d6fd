use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backend::{AudioBackend, NullBackend, OfflineBackend, StreamConfig};
use crate::clock::ClockSource;
use crate::error::AudioError;
use crate::io::{AudioClip, SampleDecoder};
use crate::mixer::RenderedSound;
use crate::synth::{Synthesizer, Voice};

/// Output permission state. Sounds are only accepted when `Ready`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioState {
    Locked,
    Unlocking,
    Ready,
    Closed,
}

/// Owns the clock, the output backend and the synthesizer. Passed by value
/// into whatever drives playback.
pub struct AudioEngine {
    clock: Box<dyn ClockSource>,
    backend: Box<dyn AudioBackend>,
    synth: Synthesizer,
    config: StreamConfig,
    state: AudioState,
}

impl AudioEngine {
    pub fn new(
        clock: Box<dyn ClockSource>,
        backend: Box<dyn AudioBackend>,
        config: StreamConfig,
    ) -> Self {
        Self {
            clock,
            backend,
            synth: Synthesizer::new(config.sample_rate),
            config,
            state: AudioState::Locked,
        }
    }

    /// Engine on an in-memory backend.
    pub fn offline(clock: impl ClockSource + 'static) -> Self {
        Self::new(
            Box::new(clock),
            Box::new(OfflineBackend::new()),
            StreamConfig::default(),
        )
    }

    /// Engine that accepts sounds and discards them, for running without
    /// an output device.
    pub fn silent(clock: impl ClockSource + 'static) -> Self {
        Self::new(
            Box::new(clock),
            Box::new(NullBackend::default()),
            StreamConfig::default(),
        )
    }

    pub fn state(&self) -> AudioState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == AudioState::Ready
    }

    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    pub fn config(&self) -> StreamConfig {
        self.config
    }

    /// First half of the unlock handshake, called from the user gesture.
    pub fn begin_unlock(&mut self) -> Result<(), AudioError> {
        match self.state {
            AudioState::Locked => {
                debug!("audio unlock requested");
                self.state = AudioState::Unlocking;
                Ok(())
            }
            AudioState::Unlocking | AudioState::Ready => Ok(()),
            AudioState::Closed => Err(AudioError::Closed),
        }
    }

    /// Acquires the output. On failure the engine returns to `Locked` so the
    /// caller can retry.
    pub fn complete_unlock(&mut self) -> Result<(), AudioError> {
        match self.state {
            AudioState::Unlocking => match self.backend.resume(&self.config) {
                Ok(rate) => {
                    self.config.sample_rate = rate;
                    self.synth.set_sample_rate(rate);
                    self.state = AudioState::Ready;
                    info!(sample_rate = rate, "audio ready");
                    Ok(())
                }
                Err(err) => {
                    warn!(%err, "audio unlock failed");
                    self.state = AudioState::Locked;
                    Err(err)
                }
            },
            AudioState::Ready => Ok(()),
            AudioState::Locked => Err(AudioError::InvalidTransition {
                from: AudioState::Locked,
                action: "complete unlock",
            }),
            AudioState::Closed => Err(AudioError::Closed),
        }
    }

    pub fn unlock(&mut self) -> Result<(), AudioError> {
        self.begin_unlock()?;
        self.complete_unlock()
    }

    /// Output was interrupted. A new unlock is required before playback.
    pub fn suspend(&mut self) {
        if self.state == AudioState::Ready {
            self.backend.suspend();
            self.state = AudioState::Locked;
            info!("audio suspended");
        }
    }

    pub fn load_sample(&mut self, name: impl Into<String>, clip: AudioClip) {
        self.synth.load_clip(name, clip);
    }

    pub fn load_sample_file(
        &mut self,
        name: impl Into<String>,
        path: impl AsRef<Path> + std::fmt::Debug,
    ) -> Result<(), AudioError> {
        let clip = SampleDecoder::open(path).map_err(|err| AudioError::Decode(err.to_string()))?;
        self.synth.load_clip(name, clip);
        Ok(())
    }

    pub fn has_sample(&self, name: &str) -> bool {
        self.synth.has_clip(name)
    }

    /// Emits `voice` at `time` on the engine clock. Does nothing and returns
    /// false unless the engine is ready.
    pub fn play_at(&mut self, time: f64, voice: &Voice) -> bool {
        if !self.is_ready() {
            return false;
        }
        let samples = self.synth.render(voice);
        let sound = RenderedSound {
            label: voice.label,
            start_time: time.max(self.now()),
            samples: samples.into(),
        };
        match self.backend.submit(sound) {
            Ok(()) => true,
            Err(err) => {
                warn!(%err, label = voice.label, "dropping sound");
                false
            }
        }
    }

    pub fn play_now(&mut self, voice: &Voice) -> bool {
        let now = self.now();
        self.play_at(now, voice)
    }

    /// Releases the output and loaded samples. The engine cannot be reused.
    pub fn shutdown(&mut self) {
        if self.state == AudioState::Closed {
            return;
        }
        self.backend.close();
        self.synth.clear_clips();
        self.state = AudioState::Closed;
        info!("audio engine shut down");
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
