use anyhow::{bail, Result};
use clap::Args;
use metra_audio::{AudioEngine, ManualClock};
use metra_trainer::{GamePhase, MetronomeTrainer, TapOutcome, TrainerEvent};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

use crate::{print_measure, print_summary, SessionArgs};

/// Measures a simulated performer may spend in UserPerformance without
/// locking in before the session is abandoned.
const MAX_WAIT_MEASURES: f64 = 4.0;

#[derive(Args, Debug)]
pub struct SimulateArgs {
    #[command(flatten)]
    pub session: SessionArgs,
    /// Largest timing error of a tap, in milliseconds
    #[arg(long = "jitter-ms", default_value_t = 20.0)]
    pub jitter_ms: f64,
    /// Chance of skipping a note entirely
    #[arg(long = "miss-rate", default_value_t = 0.05)]
    pub miss_rate: f64,
    /// Constant lateness of every tap, in milliseconds
    #[arg(long = "drift-ms", default_value_t = 0.0)]
    pub drift_ms: f64,
    /// Clock step between trainer wake-ups, in seconds
    #[arg(long, default_value_t = 0.01)]
    pub step: f64,
}

/// Taps the pattern back with human-ish timing error.
struct Performer {
    rng: StdRng,
    jitter_secs: f64,
    drift_secs: f64,
    miss_rate: f64,
}

impl Performer {
    fn new(args: &SimulateArgs) -> Self {
        let rng = match args.session.seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ 0x5eed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            jitter_secs: args.jitter_ms.max(0.0) / 1000.0,
            drift_secs: args.drift_ms / 1000.0,
            miss_rate: args.miss_rate.clamp(0.0, 1.0),
        }
    }

    /// Tap times for one measure starting at `downbeat`.
    fn plan(&mut self, downbeat: f64, onset_offsets: &[f64]) -> Vec<f64> {
        let mut taps = Vec::with_capacity(onset_offsets.len());
        for offset in onset_offsets {
            if self.rng.gen_bool(self.miss_rate) {
                continue;
            }
            // Mean of two uniforms: roughly bell-shaped around the onset.
            let spread = self.jitter_secs;
            let error = if spread > 0.0 {
                (self.rng.gen_range(-spread..=spread) + self.rng.gen_range(-spread..=spread)) / 2.0
            } else {
                0.0
            };
            taps.push(downbeat + offset + self.drift_secs + error);
        }
        taps.sort_by(f64::total_cmp);
        taps
    }
}

pub fn run(args: SimulateArgs) -> Result<()> {
    if args.step <= 0.0 {
        bail!("--step must be positive");
    }
    let settings = args.session.settings()?;
    let config = args.session.trainer_config()?;
    let clock = ManualClock::new(0.0);
    let engine = AudioEngine::silent(clock.clone());
    let mut trainer = MetronomeTrainer::new(engine, settings, config)?;
    let mut performer = Performer::new(&args);

    trainer.unlock_audio()?;
    trainer.start()?;

    let mut time = 0.0;
    let mut planned: Vec<f64> = Vec::new();
    let mut performance_since: Option<f64> = None;
    let mut completed = 0;
    let summary = loop {
        time += args.step;
        while planned.first().is_some_and(|&tap| tap <= time) {
            let tap = planned.remove(0);
            if let TapOutcome::Discarded(reason) = trainer.tap_at(tap) {
                debug!(tap, ?reason, "simulated tap discarded");
            }
        }
        clock.set(time);

        let mut events = trainer.drain_events();
        events.extend(trainer.tick());
        for event in events {
            match event {
                TrainerEvent::PhaseChanged {
                    to: GamePhase::UserPerformance,
                    at,
                    ..
                } => {
                    performance_since = Some(at);
                    let context = trainer.context();
                    if let (Some(pattern), Some(grid), Some(target)) =
                        (&context.pattern, context.grid, context.target_downbeat)
                    {
                        let offsets = pattern.onset_offsets(grid.beat_duration());
                        planned = performer.plan(target, &offsets);
                    }
                }
                TrainerEvent::MeasureEvaluated(evaluation) => {
                    completed += 1;
                    performance_since = None;
                    print_measure(completed, &evaluation);
                }
                TrainerEvent::DifficultyChanged { from, to } => {
                    println!("difficulty {from} -> {to}");
                }
                _ => {}
            }
        }

        if trainer.phase() == GamePhase::Feedback {
            if completed >= args.session.exercises {
                break trainer.end_session()?;
            }
            trainer.next_exercise()?;
        }

        if let (Some(since), Some(grid)) = (performance_since, trainer.context().grid) {
            if time - since > MAX_WAIT_MEASURES * grid.measure_duration() {
                warn!(completed, "performer never locked in, ending session");
                break trainer.end_session()?;
            }
        }
    };

    print_summary(&summary)
}
