pub mod backend;
pub mod clock;
#[cfg(feature = "device")]
pub mod device;
pub mod engine;
pub mod error;
pub mod io;
pub mod metronome;
pub mod mixer;
pub mod scheduler;
pub mod synth;

pub use backend::{AudioBackend, NullBackend, OfflineBackend, SoundLog, SoundRecord, StreamConfig};
pub use clock::{ClockSource, FrameClock, ManualClock, SystemClock};
#[cfg(feature = "device")]
pub use device::CpalBackend;
pub use engine::{AudioEngine, AudioState};
pub use error::AudioError;
pub use io::{AudioClip, SampleDecoder};
pub use metronome::{BackgroundMetronome, MetronomeVoice, METRONOME_LANE};
pub use mixer::{Mixer, RenderedSound};
pub use scheduler::{
    EventData, EventId, FiredEvent, LookaheadScheduler, SchedulerConfig, TickReport,
};
pub use synth::{Envelope, Synthesizer, Voice, VoiceSource, Waveform};
