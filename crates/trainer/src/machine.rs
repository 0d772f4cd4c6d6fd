//! The metronome trainer: one practice session as a phase machine driven by
//! `tick()` and tap input.
//!
//! Timed phase changes are stored as a single pending transition stamped with
//! the session epoch. Resetting or switching exercises bumps the epoch, so a
//! transition computed for an earlier exercise can never fire into a new one.

use std::path::Path;

use metra_audio::{
    AudioEngine, AudioError, AudioState, BackgroundMetronome, EventData, LookaheadScheduler,
    Voice, METRONOME_LANE,
};
use metra_domain::{BeatGrid, Difficulty, Pattern, Tap, TimeSignature, TrainerSettings};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::analytics::AdaptiveDifficulty;
use crate::config::TrainerConfig;
use crate::error::TrainerError;
use crate::evaluator::{evaluate_measure, preview_tap, Accuracy, MeasureEvaluation, MeasureTiming};
use crate::generator::PatternGenerator;
use crate::input::TapReceiver;
use crate::session::{SessionStats, SessionSummary};
use crate::thresholds::TimingThresholds;

pub const PATTERN_LANE: &str = "pattern";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GamePhase {
    Setup,
    CountIn,
    PatternPlayback,
    GetReady,
    UserPerformance,
    Feedback,
    SessionComplete,
}

impl GamePhase {
    /// Phases in which an exercise is in flight.
    pub fn is_exercise(self) -> bool {
        matches!(
            self,
            GamePhase::CountIn
                | GamePhase::PatternPlayback
                | GamePhase::GetReady
                | GamePhase::UserPerformance
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscardReason {
    /// Taps only count during UserPerformance.
    NotAccepting,
    /// First tap too far from any downbeat to lock in.
    OutsideAcquisitionWindow,
}

/// Immediate result of one tap.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TapOutcome {
    Accepted {
        tap: Tap,
        /// Judgement against the nearest expected onset.
        preview: Option<(Accuracy, f64)>,
    },
    Discarded(DiscardReason),
}

#[derive(Clone, Debug, PartialEq)]
pub enum TrainerEvent {
    PhaseChanged {
        from: GamePhase,
        to: GamePhase,
        at: f64,
    },
    LockedIn {
        downbeat: f64,
    },
    TapJudged {
        tap: Tap,
        preview: Option<(Accuracy, f64)>,
    },
    TapDiscarded {
        clock_time: f64,
        reason: DiscardReason,
    },
    MeasureEvaluated(MeasureEvaluation),
    DifficultyChanged {
        from: Difficulty,
        to: Difficulty,
    },
    /// 1-based beat of the running metronome.
    BeatIndicator(u32),
    SessionComplete(SessionSummary),
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct PendingTransition {
    due: f64,
    to: GamePhase,
    epoch: u64,
}

/// Per-exercise state, written only by the trainer.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionContext {
    /// Level used for the next pattern. Adaptive difficulty moves it.
    pub difficulty: Difficulty,
    pub pattern: Option<Pattern>,
    /// Grid of the background metronome for this exercise.
    pub grid: Option<BeatGrid>,
    pub playback_start: f64,
    /// Beat 1 the user is expected to come in on.
    pub target_downbeat: Option<f64>,
    pub lock_in: Option<f64>,
    pub taps: Vec<Tap>,
    pub expected_beats: Vec<f64>,
    pub last_evaluation: Option<MeasureEvaluation>,
}

impl SessionContext {
    fn new(difficulty: Difficulty) -> Self {
        Self {
            difficulty,
            pattern: None,
            grid: None,
            playback_start: 0.0,
            target_downbeat: None,
            lock_in: None,
            taps: Vec::new(),
            expected_beats: Vec::new(),
            last_evaluation: None,
        }
    }

    fn clear_exercise(&mut self) {
        self.target_downbeat = None;
        self.lock_in = None;
        self.taps.clear();
        self.expected_beats.clear();
    }
}

pub struct MetronomeTrainer {
    config: TrainerConfig,
    settings: TrainerSettings,
    scheduler: LookaheadScheduler,
    metronome: BackgroundMetronome,
    generator: PatternGenerator,
    thresholds: TimingThresholds,
    adaptive: AdaptiveDifficulty,
    stats: SessionStats,
    phase: GamePhase,
    context: SessionContext,
    pending: Option<PendingTransition>,
    epoch: u64,
    events: Vec<TrainerEvent>,
    last_indicator: Option<u32>,
}

impl MetronomeTrainer {
    pub fn new(
        engine: AudioEngine,
        settings: TrainerSettings,
        config: TrainerConfig,
    ) -> Result<Self, TrainerError> {
        config.validate()?;
        let generator = PatternGenerator::from_config(&config.patterns);
        let thresholds = TimingThresholds::for_tempo(settings.tempo_bpm as f64, &config.timing);
        Ok(Self {
            scheduler: LookaheadScheduler::new(engine, config.scheduler),
            metronome: BackgroundMetronome::new(config.metronome.schedule_horizon_secs),
            generator,
            thresholds,
            adaptive: AdaptiveDifficulty::new(config.adaptive.clone()),
            stats: SessionStats::new(),
            phase: GamePhase::Setup,
            context: SessionContext::new(settings.difficulty),
            pending: None,
            epoch: 0,
            events: Vec::new(),
            last_indicator: None,
            settings,
            config,
        })
    }

    pub fn with_generator(mut self, generator: PatternGenerator) -> Self {
        self.generator = generator;
        self
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn settings(&self) -> &TrainerSettings {
        &self.settings
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn thresholds(&self) -> TimingThresholds {
        self.thresholds
    }

    pub fn scheduler(&self) -> &LookaheadScheduler {
        &self.scheduler
    }

    pub fn now(&self) -> f64 {
        self.scheduler.now()
    }

    pub fn audio_state(&self) -> AudioState {
        self.scheduler.engine().state()
    }

    /// Clock time of the next timed phase change, if one is pending.
    pub fn next_transition_at(&self) -> Option<f64> {
        self.pending
            .filter(|p| p.epoch == self.epoch)
            .map(|p| p.due)
    }

    pub fn begin_audio_unlock(&mut self) -> Result<(), TrainerError> {
        Ok(self.scheduler.engine_mut().begin_unlock()?)
    }

    pub fn complete_audio_unlock(&mut self) -> Result<(), TrainerError> {
        Ok(self.scheduler.engine_mut().complete_unlock()?)
    }

    pub fn unlock_audio(&mut self) -> Result<(), TrainerError> {
        Ok(self.scheduler.engine_mut().unlock()?)
    }

    pub fn set_latency_offset_ms(&mut self, offset_ms: f64) {
        self.scheduler.set_latency_offset_ms(offset_ms);
    }

    /// Loads a sample for pattern onsets under the configured sample name.
    pub fn load_pattern_sample(
        &mut self,
        path: impl AsRef<Path> + std::fmt::Debug,
    ) -> Result<(), TrainerError> {
        let name = self
            .config
            .metronome
            .pattern
            .sample
            .clone()
            .ok_or_else(|| TrainerError::Config("no pattern sample name configured".into()))?;
        self.scheduler.engine_mut().load_sample_file(name, path)?;
        Ok(())
    }

    fn require_idle(&self) -> Result<(), TrainerError> {
        match self.phase {
            GamePhase::Setup | GamePhase::Feedback => Ok(()),
            actual => Err(TrainerError::InvalidPhase {
                expected: GamePhase::Setup,
                actual,
            }),
        }
    }

    /// Changes tempo between exercises. Thresholds follow; past exercises keep
    /// their scores.
    pub fn set_tempo(&mut self, tempo_bpm: u32) -> Result<(), TrainerError> {
        self.require_idle()?;
        metra_domain::settings::validate_tempo(tempo_bpm)?;
        self.settings.tempo_bpm = tempo_bpm;
        self.thresholds = TimingThresholds::for_tempo(tempo_bpm as f64, &self.config.timing);
        info!(tempo_bpm, "tempo changed");
        Ok(())
    }

    pub fn update_settings(&mut self, settings: TrainerSettings) -> Result<(), TrainerError> {
        self.require_idle()?;
        metra_domain::settings::validate_tempo(settings.tempo_bpm)?;
        self.thresholds =
            TimingThresholds::for_tempo(settings.tempo_bpm as f64, &self.config.timing);
        self.context.difficulty = settings.difficulty;
        self.settings = settings;
        Ok(())
    }

    /// Leaves Setup and starts the first exercise. Fails, staying in Setup,
    /// while audio is not unlocked.
    #[instrument(skip(self), fields(time_signature = %self.settings.time_signature))]
    pub fn start(&mut self) -> Result<(), TrainerError> {
        if self.phase != GamePhase::Setup {
            return Err(TrainerError::InvalidPhase {
                expected: GamePhase::Setup,
                actual: self.phase,
            });
        }
        if !self.scheduler.engine().is_ready() {
            return Err(AudioError::NotReady.into());
        }
        self.scheduler.start();
        self.stats = SessionStats::new();
        self.adaptive.reset();
        self.context = SessionContext::new(self.settings.difficulty);
        info!(tempo = self.settings.tempo_bpm, difficulty = %self.context.difficulty, "session started");
        let now = self.now();
        self.enter_count_in(now)
    }

    /// Starts the next exercise from Feedback.
    pub fn next_exercise(&mut self) -> Result<(), TrainerError> {
        if self.phase != GamePhase::Feedback {
            return Err(TrainerError::InvalidPhase {
                expected: GamePhase::Feedback,
                actual: self.phase,
            });
        }
        if !self.scheduler.engine().is_ready() {
            return Err(AudioError::NotReady.into());
        }
        self.cancel_exercise();
        self.scheduler.start();
        let now = self.now();
        self.enter_count_in(now)
    }

    /// Finishes the session. An exercise still in flight is dropped unscored.
    pub fn end_session(&mut self) -> Result<SessionSummary, TrainerError> {
        match self.phase {
            GamePhase::Setup | GamePhase::SessionComplete => {
                return Err(TrainerError::InvalidPhase {
                    expected: GamePhase::Feedback,
                    actual: self.phase,
                })
            }
            phase if phase.is_exercise() => {
                warn!(?phase, "ending session mid-exercise");
                self.metronome.stop(&mut self.scheduler);
                self.cancel_exercise();
            }
            _ => {}
        }
        self.scheduler.stop();
        let summary = self.stats.summary();
        let at = self.now();
        self.set_phase(GamePhase::SessionComplete, at);
        info!(
            exercises = summary.exercises_completed,
            score = summary.final_score_percentage,
            "session complete"
        );
        self.events
            .push(TrainerEvent::SessionComplete(summary.clone()));
        Ok(summary)
    }

    /// Back to Setup from anywhere. Stats are discarded and every pending
    /// sound or transition is invalidated.
    pub fn reset(&mut self) {
        self.metronome.stop(&mut self.scheduler);
        self.cancel_exercise();
        self.scheduler.clear();
        self.scheduler.stop();
        self.stats = SessionStats::new();
        self.adaptive.reset();
        self.context = SessionContext::new(self.settings.difficulty);
        let at = self.now();
        if self.phase != GamePhase::Setup {
            self.set_phase(GamePhase::Setup, at);
        }
        info!(epoch = self.epoch, "trainer reset");
    }

    /// One wake-up of the trainer loop.
    pub fn tick(&mut self) -> Vec<TrainerEvent> {
        let now = self.now();
        self.process_due(now);
        self.metronome.pump(&mut self.scheduler);
        let report = self.scheduler.tick();
        if report.visual_frame {
            let beat = self.metronome.beat_indicator(report.now);
            if beat != self.last_indicator {
                self.last_indicator = beat;
                if let Some(beat) = beat {
                    self.events.push(TrainerEvent::BeatIndicator(beat));
                }
            }
        }
        self.drain_events()
    }

    pub fn drain_events(&mut self) -> Vec<TrainerEvent> {
        std::mem::take(&mut self.events)
    }

    /// A tap at the current clock time.
    pub fn tap(&mut self) -> TapOutcome {
        let now = self.now();
        self.tap_at(now)
    }

    /// Handles every tap queued by an input thread, oldest first.
    pub fn process_taps(&mut self, receiver: &mut TapReceiver) -> Vec<TapOutcome> {
        receiver
            .drain()
            .into_iter()
            .map(|time| self.tap_at(time))
            .collect()
    }

    /// A tap captured at `clock_time`. Timed transitions due by then are
    /// applied first.
    pub fn tap_at(&mut self, clock_time: f64) -> TapOutcome {
        self.process_due(clock_time);
        if self.phase != GamePhase::UserPerformance {
            return self.discard(clock_time, DiscardReason::NotAccepting);
        }
        let lock = match self.context.lock_in {
            Some(lock) => lock,
            None => match self.acquire(clock_time) {
                Some(lock) => lock,
                None => return self.discard(clock_time, DiscardReason::OutsideAcquisitionWindow),
            },
        };

        let tap = Tap::at(clock_time).relative_to(lock);
        self.context.taps.push(tap);
        let preview = match (tap.relative_time, self.measure_timing()) {
            (Some(relative), Some(timing)) => {
                preview_tap(relative, &self.context.expected_beats, timing, &self.thresholds)
            }
            _ => None,
        };
        if self.config.metronome.tap_feedback {
            let voice = Voice::tap(self.config.metronome.tap_volume);
            self.scheduler.engine_mut().play_now(&voice);
        }
        debug!(clock_time, ?preview, "tap accepted");
        self.events.push(TrainerEvent::TapJudged { tap, preview });
        TapOutcome::Accepted { tap, preview }
    }

    /// Locks the measure origin to the downbeat the first tap aimed at.
    fn acquire(&mut self, clock_time: f64) -> Option<f64> {
        let grid = self.context.grid?;
        let target = self.context.target_downbeat?;
        let downbeat = grid.nearest_downbeat(clock_time).max(target);
        let tolerance = self.config.timing.acquisition_tolerance_beats * grid.beat_duration();
        if (clock_time - downbeat).abs() > tolerance {
            return None;
        }
        self.context.lock_in = Some(downbeat);
        self.context.expected_beats = self
            .context
            .pattern
            .as_ref()
            .map(Pattern::onset_beats)
            .unwrap_or_default();
        self.schedule_transition(downbeat + grid.measure_duration(), GamePhase::Feedback);
        info!(downbeat, offset_ms = (clock_time - downbeat) * 1000.0, "locked in");
        self.events.push(TrainerEvent::LockedIn { downbeat });
        Some(downbeat)
    }

    fn discard(&mut self, clock_time: f64, reason: DiscardReason) -> TapOutcome {
        debug!(clock_time, ?reason, "tap discarded");
        self.events
            .push(TrainerEvent::TapDiscarded { clock_time, reason });
        TapOutcome::Discarded(reason)
    }

    fn measure_timing(&self) -> Option<MeasureTiming> {
        let grid = self.context.grid?;
        Some(MeasureTiming {
            beat_duration: grid.beat_duration(),
            beats_per_measure: grid.beats_per_measure,
        })
    }

    fn signature(&self) -> &'static TimeSignature {
        self.settings.time_signature.definition()
    }

    fn schedule_transition(&mut self, due: f64, to: GamePhase) {
        debug!(due, ?to, "transition scheduled");
        self.pending = Some(PendingTransition {
            due,
            to,
            epoch: self.epoch,
        });
    }

    fn process_due(&mut self, now: f64) {
        while let Some(pending) = self.pending {
            if pending.epoch != self.epoch {
                self.pending = None;
                break;
            }
            if pending.due > now {
                break;
            }
            self.pending = None;
            self.enter(pending.to, pending.due);
        }
    }

    fn set_phase(&mut self, to: GamePhase, at: f64) {
        let from = self.phase;
        self.phase = to;
        info!(?from, ?to, at, "phase changed");
        self.events.push(TrainerEvent::PhaseChanged { from, to, at });
    }

    /// Drops everything belonging to the current exercise.
    fn cancel_exercise(&mut self) {
        self.epoch += 1;
        self.pending = None;
        self.scheduler.set_visual_enabled(false);
        self.scheduler.cancel_lane(PATTERN_LANE);
        self.scheduler.cancel_lane(METRONOME_LANE);
        self.context.clear_exercise();
        self.last_indicator = None;
    }

    fn enter_count_in(&mut self, now: f64) -> Result<(), TrainerError> {
        let sig = self.signature();
        let tempo = self.settings.tempo_bpm as f64;
        let origin = now + self.config.timing.start_delay_secs;
        let grid = BeatGrid::for_signature(origin, tempo, sig)?;

        let pattern = self.generator.get_pattern_for(
            self.settings.time_signature,
            self.context.difficulty,
            self.config.patterns.prefer_curated,
        );
        debug!(steps = ?pattern.steps(), source = ?pattern.source, "pattern selected");

        self.metronome.set_voice(self.config.metronome.count_in);
        if !self
            .metronome
            .start(&mut self.scheduler, origin, tempo, sig.beats_per_measure as u32)
        {
            return Err(AudioError::NotReady.into());
        }
        self.scheduler.set_visual_enabled(true);

        self.context.clear_exercise();
        self.context.pattern = Some(pattern);
        self.context.grid = Some(grid);
        self.context.playback_start = origin + grid.measure_duration();
        self.set_phase(GamePhase::CountIn, now);

        let lookahead = self.scheduler.config().lookahead_secs;
        self.schedule_transition(
            self.context.playback_start - lookahead,
            GamePhase::PatternPlayback,
        );
        Ok(())
    }

    fn enter(&mut self, to: GamePhase, at: f64) {
        match to {
            GamePhase::PatternPlayback => self.enter_pattern_playback(at),
            GamePhase::GetReady => self.enter_get_ready(at),
            GamePhase::UserPerformance => self.enter_user_performance(at),
            GamePhase::Feedback => self.enter_feedback(at),
            other => warn!(?other, "no timed entry for phase"),
        }
    }

    fn pattern_voice(&self) -> Voice {
        let cfg = &self.config.metronome.pattern;
        match &cfg.sample {
            Some(name) if self.scheduler.engine().has_sample(name) => {
                Voice::sample(name.clone(), cfg.length_secs, cfg.volume)
            }
            _ => Voice::pattern_tone(cfg.frequency, cfg.length_secs, cfg.volume),
        }
    }

    fn enter_pattern_playback(&mut self, at: f64) {
        self.metronome.set_voice(self.config.metronome.playback);
        let Some(grid) = self.context.grid else {
            warn!("pattern playback without a grid");
            return;
        };
        let offsets = self
            .context
            .pattern
            .as_ref()
            .map(|p| p.onset_offsets(grid.beat_duration()))
            .unwrap_or_default();
        let start = self.context.playback_start;
        let voice = self.pattern_voice();
        for (index, offset) in offsets.iter().enumerate() {
            let voice = voice.clone();
            self.scheduler.schedule_at(
                start + offset,
                EventData::new(PATTERN_LANE, index),
                move |engine, event| {
                    engine.play_at(event.time, &voice);
                },
            );
        }
        debug!(onsets = offsets.len(), start, "pattern scheduled");
        self.set_phase(GamePhase::PatternPlayback, at);
        self.schedule_transition(start + grid.measure_duration(), GamePhase::GetReady);
    }

    fn enter_get_ready(&mut self, at: f64) {
        let Some(grid) = self.context.grid else {
            warn!("get ready without a grid");
            return;
        };
        let lead = self.config.timing.get_ready_lead_secs;
        let target = grid.next_downbeat_after(at + lead);
        self.context.target_downbeat = Some(target);
        self.set_phase(GamePhase::GetReady, at);
        self.schedule_transition(target - lead, GamePhase::UserPerformance);
    }

    fn enter_user_performance(&mut self, at: f64) {
        self.metronome.set_voice(self.config.metronome.performance);
        self.context.taps.clear();
        self.context.lock_in = None;
        self.set_phase(GamePhase::UserPerformance, at);
    }

    #[instrument(skip(self))]
    fn enter_feedback(&mut self, at: f64) {
        self.metronome.stop(&mut self.scheduler);
        let relative: Vec<f64> = self
            .context
            .taps
            .iter()
            .filter_map(|tap| tap.relative_time)
            .collect();
        let evaluation = match self.measure_timing() {
            Some(timing) => evaluate_measure(
                &self.context.expected_beats,
                &relative,
                timing,
                &self.thresholds,
                &self.config.scoring,
            ),
            None => {
                warn!("feedback without a grid");
                MeasureEvaluation::default()
            }
        };
        self.stats.record(&evaluation);
        info!(
            accuracy = evaluation.accuracy_percentage,
            score = evaluation.score,
            passed = evaluation.passed,
            "exercise evaluated"
        );
        self.set_phase(GamePhase::Feedback, at);
        self.events
            .push(TrainerEvent::MeasureEvaluated(evaluation.clone()));

        if self.settings.adaptive_difficulty {
            let current = self.context.difficulty;
            if let Some(next) = self.adaptive.observe(evaluation.accuracy_percentage, current) {
                self.context.difficulty = next;
                self.events.push(TrainerEvent::DifficultyChanged {
                    from: current,
                    to: next,
                });
            }
        }
        self.context.last_evaluation = Some(evaluation);
    }
}
