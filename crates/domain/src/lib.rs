pub mod difficulty;
pub mod duration;
pub mod error;
pub mod grid;
pub mod library;
pub mod pattern;
pub mod settings;
pub mod tap;
pub mod time_signature;

pub use crate::difficulty::Difficulty;
pub use crate::duration::NoteDuration;
pub use crate::error::DomainError;
pub use crate::grid::{circular_beat_distance, BeatGrid, MAX_TEMPO_BPM, MIN_TEMPO_BPM};
pub use crate::library::{CuratedEntry, LibraryFormat, PatternBuckets, PatternDatabase};
pub use crate::pattern::{DurationRun, Pattern, PatternSource, SchemaNote};
pub use crate::settings::{SettingsInput, TimeSignatureInput, TrainerSettings};
pub use crate::tap::Tap;
pub use crate::time_signature::{TimeSignature, TimeSignatureId};
