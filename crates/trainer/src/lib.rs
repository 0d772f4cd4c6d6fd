pub mod analytics;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod generator;
pub mod input;
pub mod library;
pub mod machine;
#[cfg(feature = "midi")]
pub mod midi;
pub mod session;
pub mod thresholds;

pub use analytics::AdaptiveDifficulty;
pub use config::{
    AdaptiveConfig, MetronomeConfig, PatternConfig, PatternVoiceConfig, ScoringConfig,
    TimingConfig, TrainerConfig,
};
pub use error::TrainerError;
pub use evaluator::{
    classify, evaluate_measure, preview_tap, Accuracy, MeasureEvaluation, MeasureTiming,
    OnsetResult,
};
pub use generator::{GenerationRules, PatternGenerator};
pub use input::{tap_channel, TapReceiver, TapSender, DEFAULT_TAP_CAPACITY};
pub use library::{DirectoryLoader, EmbeddedLoader, LibraryLoader, LibrarySource, PatternLibrary};
pub use machine::{
    DiscardReason, GamePhase, MetronomeTrainer, SessionContext, TapOutcome, TrainerEvent,
    PATTERN_LANE,
};
#[cfg(feature = "midi")]
pub use midi::{MidiDevice, MidiTapInput};
pub use session::{SessionStats, SessionSummary};
pub use thresholds::{calculate_timing_thresholds, TimingThresholds};
