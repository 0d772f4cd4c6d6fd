use metra_audio::{AudioEngine, ManualClock, OfflineBackend, SoundLog, StreamConfig, METRONOME_LANE};
use metra_domain::{Difficulty, TimeSignatureId, TrainerSettings};
use metra_trainer::{
    tap_channel, Accuracy, DiscardReason, GamePhase, LibraryLoader, LibrarySource,
    MetronomeTrainer, PatternGenerator, PatternLibrary, TapOutcome, TrainerConfig, TrainerEvent,
    PATTERN_LANE,
};

const QUARTERS: &str = r#"{
    "timeSignature": "4/4",
    "patterns": {
        "beginner": [[1,0,0,0,1,0,0,0,1,0,0,0,1,0,0,0]],
        "intermediate": [[1,0,0,0,1,0,0,0,1,0,0,0,1,0,0,0]],
        "advanced": [[1,0,0,0,1,0,0,0,1,0,0,0,1,0,0,0]]
    }
}"#;

#[derive(Debug)]
struct QuarterNotes;

impl LibraryLoader for QuarterNotes {
    fn load(&self, _: TimeSignatureId) -> anyhow::Result<Option<LibrarySource>> {
        Ok(Some(LibrarySource {
            text: QUARTERS.to_string(),
            format: metra_domain::LibraryFormat::Json,
            origin: "quarters".into(),
        }))
    }
}

struct Harness {
    trainer: MetronomeTrainer,
    clock: ManualClock,
    log: SoundLog,
    time: f64,
    events: Vec<TrainerEvent>,
}

impl Harness {
    fn new(adaptive: bool) -> Self {
        let clock = ManualClock::new(0.0);
        let backend = OfflineBackend::new();
        let log = backend.log();
        let engine = AudioEngine::new(
            Box::new(clock.clone()),
            Box::new(backend),
            StreamConfig::default(),
        );
        let settings = TrainerSettings::new(Difficulty::Beginner, TimeSignatureId::FourFour, 120)
            .unwrap()
            .with_adaptive(adaptive);
        let generator = PatternGenerator::new(PatternLibrary::new(Box::new(QuarterNotes)), Some(1));
        let mut trainer = MetronomeTrainer::new(engine, settings, TrainerConfig::default())
            .unwrap()
            .with_generator(generator);
        trainer.unlock_audio().unwrap();
        Self {
            trainer,
            clock,
            log,
            time: 0.0,
            events: Vec::new(),
        }
    }

    fn run_until(&mut self, until: f64) {
        while self.time < until {
            self.time += 0.05;
            self.clock.set(self.time);
            let events = self.trainer.tick();
            self.events.extend(events);
        }
    }

    fn tap_at(&mut self, time: f64) -> TapOutcome {
        let outcome = self.trainer.tap_at(time);
        self.events.extend(self.trainer.drain_events());
        outcome
    }

    /// Runs one exercise from its count-in through Feedback, tapping at the
    /// given beat offsets from the target downbeat.
    fn play_exercise(&mut self, beats: &[f64]) {
        let start = self.time;
        self.run_until(start + 6.0);
        assert_eq!(self.trainer.phase(), GamePhase::UserPerformance);
        let target = self.trainer.context().target_downbeat.unwrap();
        for beat in beats {
            let outcome = self.tap_at(target + beat * 0.5);
            assert!(matches!(outcome, TapOutcome::Accepted { .. }), "{outcome:?}");
        }
        self.run_until(target + 2.2);
        assert_eq!(self.trainer.phase(), GamePhase::Feedback);
    }

    fn phases(&self) -> Vec<GamePhase> {
        self.events
            .iter()
            .filter_map(|event| match event {
                TrainerEvent::PhaseChanged { to, .. } => Some(*to),
                _ => None,
            })
            .collect()
    }
}

#[test]
fn full_session_walks_every_phase() {
    let mut h = Harness::new(false);
    h.trainer.start().unwrap();
    h.events.extend(h.trainer.drain_events());

    h.run_until(2.5);
    assert_eq!(h.trainer.phase(), GamePhase::PatternPlayback);
    h.run_until(4.5);
    assert_eq!(h.trainer.phase(), GamePhase::GetReady);
    assert_eq!(h.log.count("pattern"), 4);
    assert!(h.log.count("click") >= 8);

    // Beat 1 after the get-ready measure.
    let target = h.trainer.context().target_downbeat.unwrap();
    assert!((target - 6.1).abs() < 1e-9);

    h.run_until(5.0);
    assert_eq!(h.trainer.tap(), TapOutcome::Discarded(DiscardReason::NotAccepting));

    h.run_until(6.0);
    assert_eq!(h.trainer.phase(), GamePhase::UserPerformance);
    for time in [6.1, 6.6, 7.1, 7.6] {
        match h.tap_at(time) {
            TapOutcome::Accepted { preview, .. } => {
                assert_eq!(preview.map(|p| p.0), Some(Accuracy::Perfect));
            }
            other => panic!("tap at {time} not accepted: {other:?}"),
        }
    }
    assert_eq!(h.log.count("tap"), 4);

    h.run_until(8.3);
    assert_eq!(h.trainer.phase(), GamePhase::Feedback);
    assert_eq!(h.trainer.scheduler().pending_in_lane(METRONOME_LANE), 0);
    let evaluation = h.trainer.context().last_evaluation.clone().unwrap();
    assert_eq!(evaluation.perfect, 4);
    assert_eq!(evaluation.score, 440);
    assert_eq!(evaluation.max_combo, 4);
    assert!(evaluation.passed);

    h.trainer.next_exercise().unwrap();
    h.play_exercise(&[0.0, 1.0, 2.0]);
    let evaluation = h.trainer.context().last_evaluation.clone().unwrap();
    assert_eq!((evaluation.perfect, evaluation.miss), (3, 1));
    assert_eq!(evaluation.score, 320);
    assert_eq!(evaluation.final_combo, 0);

    let summary = h.trainer.end_session().unwrap();
    h.events.extend(h.trainer.drain_events());
    assert_eq!(h.trainer.phase(), GamePhase::SessionComplete);
    assert_eq!(summary.exercises_completed, 2);
    assert_eq!(summary.per_exercise_scores, vec![100.0, 75.0]);
    assert_eq!(summary.final_score_percentage, 88.0);
    assert_eq!(summary.max_combo, 4);
    assert_eq!(summary.perfect_count, 7);
    assert_eq!(summary.miss_count, 1);

    let completions = h
        .events
        .iter()
        .filter(|e| matches!(e, TrainerEvent::SessionComplete(_)))
        .count();
    assert_eq!(completions, 1);
    assert!(h
        .events
        .iter()
        .any(|e| matches!(e, TrainerEvent::BeatIndicator(1))));

    let phases = h.phases();
    assert_eq!(
        &phases[..6],
        &[
            GamePhase::CountIn,
            GamePhase::PatternPlayback,
            GamePhase::GetReady,
            GamePhase::UserPerformance,
            GamePhase::Feedback,
            GamePhase::CountIn,
        ]
    );
    assert_eq!(phases.last(), Some(&GamePhase::SessionComplete));
}

#[test]
fn first_tap_may_lock_onto_a_later_downbeat() {
    let mut h = Harness::new(false);
    h.trainer.start().unwrap();
    h.run_until(6.0);
    let target = h.trainer.context().target_downbeat.unwrap();

    // Almost two beats past the target: too far from any downbeat.
    assert_eq!(
        h.tap_at(target + 0.9),
        TapOutcome::Discarded(DiscardReason::OutsideAcquisitionWindow)
    );
    assert!(h.trainer.context().taps.is_empty());

    // The user comes in on the following measure instead.
    h.run_until(target + 1.9);
    assert_eq!(h.trainer.phase(), GamePhase::UserPerformance);
    let late = target + 2.0 + 0.03;
    assert!(matches!(h.tap_at(late), TapOutcome::Accepted { .. }));
    let lock = h.trainer.context().lock_in.unwrap();
    assert!((lock - (target + 2.0)).abs() < 1e-9);
    assert!((h.trainer.next_transition_at().unwrap() - (lock + 2.0)).abs() < 1e-9);
}

#[test]
fn queued_taps_are_judged_at_their_capture_time() {
    let mut h = Harness::new(false);
    h.trainer.start().unwrap();
    h.run_until(6.0);
    let target = h.trainer.context().target_downbeat.unwrap();

    let (mut sender, mut receiver) = tap_channel(8, h.clock.clone());
    assert!(sender.tap_at(target));
    assert!(sender.tap_at(target + 0.5));
    // Drained well after capture; the stamps still decide the judgement.
    h.run_until(target + 0.8);
    let outcomes = h.trainer.process_taps(&mut receiver);
    assert_eq!(outcomes.len(), 2);
    for outcome in outcomes {
        match outcome {
            TapOutcome::Accepted { preview, .. } => {
                assert_eq!(preview.map(|p| p.0), Some(Accuracy::Perfect));
            }
            other => panic!("queued tap not accepted: {other:?}"),
        }
    }
    let lock = h.trainer.context().lock_in.unwrap();
    assert!((lock - target).abs() < 1e-9);
    assert!(receiver.is_empty());
}

#[test]
fn reset_silences_the_exercise_in_flight() {
    let mut h = Harness::new(false);
    h.trainer.start().unwrap();
    h.run_until(2.3);
    assert_eq!(h.trainer.phase(), GamePhase::PatternPlayback);
    let played = h.log.count("pattern");

    h.trainer.reset();
    h.trainer.drain_events();
    h.events.clear();
    h.run_until(9.0);

    assert_eq!(h.trainer.phase(), GamePhase::Setup);
    assert!(h.phases().is_empty());
    assert_eq!(h.log.count("pattern"), played);
    assert_eq!(h.trainer.scheduler().pending_in_lane(PATTERN_LANE), 0);
    assert_eq!(h.trainer.stats().exercises_completed, 0);

    // A fresh session starts cleanly afterwards.
    h.trainer.start().unwrap();
    assert_eq!(h.trainer.phase(), GamePhase::CountIn);
}

#[test]
fn adaptive_difficulty_promotes_after_two_strong_exercises() {
    let mut h = Harness::new(true);
    h.trainer.start().unwrap();
    h.play_exercise(&[0.0, 1.0, 2.0, 3.0]);
    assert_eq!(h.trainer.context().difficulty, Difficulty::Beginner);

    h.trainer.next_exercise().unwrap();
    h.play_exercise(&[0.0, 1.0, 2.0, 3.0]);
    assert_eq!(h.trainer.context().difficulty, Difficulty::Intermediate);
    assert!(h.events.iter().any(|e| matches!(
        e,
        TrainerEvent::DifficultyChanged {
            from: Difficulty::Beginner,
            to: Difficulty::Intermediate
        }
    )));

    h.trainer.next_exercise().unwrap();
    assert_eq!(
        h.trainer.context().pattern.as_ref().unwrap().difficulty,
        Difficulty::Intermediate
    );
}

#[test]
fn ending_mid_exercise_scores_nothing() {
    let mut h = Harness::new(false);
    h.trainer.start().unwrap();
    h.run_until(3.0);
    let summary = h.trainer.end_session().unwrap();
    assert_eq!(summary.exercises_completed, 0);
    assert_eq!(summary.final_score_percentage, 0.0);
    assert!(h.trainer.end_session().is_err());
}
