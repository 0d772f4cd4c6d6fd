use std::io::BufRead;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use metra_audio::AudioEngine;
use metra_trainer::{
    tap_channel, GamePhase, MetronomeTrainer, TapOutcome, TapReceiver, TapSender, TrainerEvent,
    DEFAULT_TAP_CAPACITY,
};
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{info, warn};

use crate::{print_measure, print_summary, SessionArgs};

#[cfg(feature = "device")]
type OutputClock = metra_audio::FrameClock;
#[cfg(not(feature = "device"))]
type OutputClock = metra_audio::SystemClock;

#[derive(Args, Debug)]
pub struct PlayArgs {
    #[command(flatten)]
    pub session: SessionArgs,
    /// Output device name; the system default when omitted
    #[cfg(feature = "device")]
    #[arg(long)]
    pub device: Option<String>,
    /// Take taps from a MIDI input as well; an empty value picks the first port
    #[cfg(feature = "midi")]
    #[arg(long, num_args = 0..=1, default_missing_value = "")]
    pub midi: Option<String>,
    /// Audio sample played for pattern notes instead of the synthetic tone
    #[arg(long)]
    pub sample: Option<PathBuf>,
    /// Output latency to compensate, in milliseconds
    #[arg(long = "latency-ms", default_value_t = 0.0)]
    pub latency_ms: f64,
}

#[derive(Debug)]
enum Command {
    Tap,
    Quit,
}

#[cfg(feature = "device")]
fn open_output(args: &PlayArgs) -> (AudioEngine, OutputClock) {
    let backend = metra_audio::CpalBackend::new(args.device.clone());
    let clock = backend.clock();
    let engine = AudioEngine::new(
        Box::new(clock.clone()),
        Box::new(backend),
        metra_audio::StreamConfig::default(),
    );
    (engine, clock)
}

#[cfg(not(feature = "device"))]
fn open_output(_args: &PlayArgs) -> (AudioEngine, OutputClock) {
    let clock = metra_audio::SystemClock::new();
    info!("built without the device feature, audio is silent");
    (AudioEngine::silent(clock.clone()), clock)
}

/// Reads stdin on its own thread. Every line is a tap, stamped before the
/// loop is woken; `q` ends the session.
fn spawn_stdin(mut sender: TapSender, commands: UnboundedSender<Command>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if line.trim().eq_ignore_ascii_case("q") {
                break;
            }
            sender.tap_now();
            if commands.send(Command::Tap).is_err() {
                return;
            }
        }
        let _ = commands.send(Command::Quit);
    });
}

fn report(event: &TrainerEvent, completed: &mut u32) {
    match event {
        TrainerEvent::PhaseChanged { to, .. } => match to {
            GamePhase::CountIn => println!("listen: count-in"),
            GamePhase::PatternPlayback => println!("listen: pattern"),
            GamePhase::GetReady => println!("get ready..."),
            GamePhase::UserPerformance => println!("your turn: tap from beat 1"),
            _ => {}
        },
        TrainerEvent::BeatIndicator(beat) => println!("  {beat}"),
        TrainerEvent::LockedIn { .. } => println!("  locked in"),
        TrainerEvent::TapJudged {
            preview: Some((accuracy, error_ms)),
            ..
        } => println!("  {accuracy:?} ({error_ms:+.0} ms)"),
        TrainerEvent::MeasureEvaluated(evaluation) => {
            *completed += 1;
            print_measure(*completed, evaluation);
        }
        TrainerEvent::DifficultyChanged { from, to } => println!("difficulty {from} -> {to}"),
        _ => {}
    }
}

pub async fn run(args: PlayArgs) -> Result<()> {
    let settings = args.session.settings()?;
    let mut config = args.session.trainer_config()?;
    if args.sample.is_some() && config.metronome.pattern.sample.is_none() {
        config.metronome.pattern.sample = Some("pattern-sample".into());
    }
    let tick = Duration::from_secs_f64(
        config
            .scheduler
            .visual_interval_secs
            .min(config.scheduler.tick_interval_secs),
    );

    let (engine, clock) = open_output(&args);
    let mut trainer = MetronomeTrainer::new(engine, settings, config)?;
    trainer.set_latency_offset_ms(args.latency_ms);
    if let Some(path) = &args.sample {
        trainer.load_pattern_sample(path)?;
    }

    let (commands_tx, mut commands) = mpsc::unbounded_channel();
    let mut receivers: Vec<TapReceiver> = Vec::new();
    let (sender, receiver) = tap_channel(DEFAULT_TAP_CAPACITY, clock.clone());
    receivers.push(receiver);
    spawn_stdin(sender, commands_tx);

    #[cfg(feature = "midi")]
    let _midi = match &args.midi {
        Some(port) => {
            let (sender, receiver) = tap_channel(DEFAULT_TAP_CAPACITY, clock.clone());
            receivers.push(receiver);
            let port = (!port.is_empty()).then_some(port.as_str());
            let input = metra_trainer::MidiTapInput::connect(port, sender)?;
            println!("MIDI taps from {}", input.port_name());
            Some(input)
        }
        None => None,
    };

    println!("press Enter to start; Enter taps, q quits");
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut completed = 0;
    let mut quit = false;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            command = commands.recv() => match command {
                Some(Command::Tap) => {}
                Some(Command::Quit) | None => quit = true,
            },
        }

        let mut gestures = 0;
        for receiver in receivers.iter_mut() {
            for outcome in trainer.process_taps(receiver) {
                if matches!(outcome, TapOutcome::Discarded(_)) {
                    gestures += 1;
                }
            }
        }

        match trainer.phase() {
            GamePhase::Setup if gestures > 0 => {
                // The first key press doubles as the unlock gesture.
                trainer.unlock_audio()?;
                trainer.start()?;
                info!("session started from the terminal");
            }
            GamePhase::Feedback if gestures > 0 => {
                if completed >= args.session.exercises {
                    quit = true;
                } else {
                    trainer.next_exercise()?;
                }
            }
            _ => {}
        }

        let mut events = trainer.drain_events();
        events.extend(trainer.tick());
        for event in &events {
            report(event, &mut completed);
        }
        let entered_feedback = events.iter().any(|event| {
            matches!(
                event,
                TrainerEvent::PhaseChanged {
                    to: GamePhase::Feedback,
                    ..
                }
            )
        });
        if entered_feedback {
            if completed >= args.session.exercises {
                quit = true;
            } else {
                println!("press Enter for the next exercise, q to finish");
            }
        }

        if quit {
            break;
        }
    }

    match trainer.phase() {
        GamePhase::Setup | GamePhase::SessionComplete => {
            warn!("no session was played");
            Ok(())
        }
        _ => {
            let summary = trainer.end_session()?;
            print_summary(&summary)
        }
    }
}
