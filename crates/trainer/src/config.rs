//! Runtime configuration for a trainer session, loaded from JSON.
//!
//! Every field has a default, so a config file only needs the values it
//! overrides.

use std::fs;
use std::path::{Path, PathBuf};

use metra_audio::{MetronomeVoice, SchedulerConfig};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::TrainerError;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrainerConfig {
    pub scheduler: SchedulerConfig,
    pub timing: TimingConfig,
    pub scoring: ScoringConfig,
    pub metronome: MetronomeConfig,
    pub patterns: PatternConfig,
    pub adaptive: AdaptiveConfig,
}

/// Tolerance windows and phase timing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimingConfig {
    /// Windows at `reference_bpm`, in milliseconds.
    pub perfect_ms: f64,
    pub good_ms: f64,
    pub fair_ms: f64,
    pub reference_bpm: f64,
    /// Windows scale by `(reference_bpm / tempo)^exponent`.
    pub exponent: f64,
    /// How far, in beats, the first tap may sit from a downbeat and still lock in.
    pub acquisition_tolerance_beats: f64,
    /// UserPerformance opens this long before the target downbeat.
    pub get_ready_lead_secs: f64,
    /// Delay between pressing start and the first count-in click.
    pub start_delay_secs: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            perfect_ms: 50.0,
            good_ms: 75.0,
            fair_ms: 125.0,
            reference_bpm: 120.0,
            exponent: 0.3,
            acquisition_tolerance_beats: 1.2,
            get_ready_lead_secs: 0.2,
            start_delay_secs: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScoringConfig {
    pub perfect_points: u32,
    pub good_points: u32,
    pub fair_points: u32,
    pub miss_points: u32,
    /// Combo length at which the multiplier applies.
    pub combo_threshold: u32,
    pub combo_multiplier: f64,
    pub pass_percentage: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            perfect_points: 100,
            good_points: 75,
            fair_points: 50,
            miss_points: 0,
            combo_threshold: 3,
            combo_multiplier: 1.2,
            pass_percentage: 50.0,
        }
    }
}

/// Sound of the pattern onsets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PatternVoiceConfig {
    pub frequency: f32,
    pub length_secs: f64,
    pub volume: f32,
    /// Name of a loaded sample to play instead of the synthetic tone.
    pub sample: Option<String>,
}

impl Default for PatternVoiceConfig {
    fn default() -> Self {
        Self {
            frequency: 600.0,
            length_secs: 0.1,
            volume: 0.4,
            sample: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetronomeConfig {
    pub count_in: MetronomeVoice,
    /// Used during PatternPlayback and GetReady.
    pub playback: MetronomeVoice,
    pub performance: MetronomeVoice,
    pub pattern: PatternVoiceConfig,
    pub tap_feedback: bool,
    pub tap_volume: f32,
    /// How far ahead of the clock metronome clicks are queued.
    pub schedule_horizon_secs: f64,
}

impl Default for MetronomeConfig {
    fn default() -> Self {
        Self {
            count_in: MetronomeVoice {
                downbeat_hz: 900.0,
                beat_hz: 700.0,
                volume: 0.15,
            },
            playback: MetronomeVoice {
                downbeat_hz: 600.0,
                beat_hz: 500.0,
                volume: 0.06,
            },
            performance: MetronomeVoice::default(),
            pattern: PatternVoiceConfig::default(),
            tap_feedback: true,
            tap_volume: 0.8,
            schedule_horizon_secs: 0.25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PatternConfig {
    pub prefer_curated: bool,
    /// Directory of `<n>-<d>.json|yaml` libraries. Built-in libraries are
    /// used when unset.
    pub library_dir: Option<PathBuf>,
    /// Fixed seed for reproducible generation.
    pub seed: Option<u64>,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            prefer_curated: true,
            library_dir: None,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AdaptiveConfig {
    pub promote_percentage: f64,
    /// Consecutive exercises at or above `promote_percentage` needed to move up.
    pub promote_streak: u32,
    pub demote_percentage: f64,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            promote_percentage: 90.0,
            promote_streak: 2,
            demote_percentage: 50.0,
        }
    }
}

impl TrainerConfig {
    pub fn from_json_str(json: &str) -> Result<Self, TrainerError> {
        let config: Self =
            serde_json::from_str(json).map_err(|err| TrainerError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, TrainerError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|err| TrainerError::Config(format!("read {:?}: {err}", path)))?;
        let config = Self::from_json_str(&contents)?;
        info!(?path, "loaded trainer configuration");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TrainerError> {
        let t = &self.timing;
        if !(t.perfect_ms > 0.0 && t.perfect_ms < t.good_ms && t.good_ms < t.fair_ms) {
            return Err(TrainerError::Config(
                "timing windows must satisfy 0 < perfect < good < fair".into(),
            ));
        }
        if t.reference_bpm <= 0.0 || t.exponent < 0.0 {
            return Err(TrainerError::Config(
                "reference tempo must be positive and exponent non-negative".into(),
            ));
        }
        if !(t.acquisition_tolerance_beats.is_finite() && t.acquisition_tolerance_beats > 0.0) {
            return Err(TrainerError::Config(
                "acquisition tolerance must be a positive number of beats".into(),
            ));
        }
        for (name, secs) in [
            ("get-ready lead", t.get_ready_lead_secs),
            ("start delay", t.start_delay_secs),
        ] {
            if !(secs.is_finite() && secs >= 0.0) {
                return Err(TrainerError::Config(format!(
                    "{name} must be a non-negative number of seconds"
                )));
            }
        }
        if self.scheduler.lookahead_secs <= 0.0 || self.scheduler.tick_interval_secs <= 0.0 {
            return Err(TrainerError::Config(
                "scheduler intervals must be positive".into(),
            ));
        }
        if self.metronome.schedule_horizon_secs < self.scheduler.lookahead_secs {
            return Err(TrainerError::Config(
                "metronome horizon must cover the scheduler lookahead".into(),
            ));
        }
        Ok(())
    }
}
