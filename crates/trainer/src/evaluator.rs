use metra_domain::circular_beat_distance;
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::config::ScoringConfig;
use crate::thresholds::TimingThresholds;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accuracy {
    Perfect,
    Good,
    Fair,
    Miss,
}

impl Accuracy {
    /// Higher is better.
    pub fn rank(self) -> u8 {
        match self {
            Accuracy::Perfect => 3,
            Accuracy::Good => 2,
            Accuracy::Fair => 1,
            Accuracy::Miss => 0,
        }
    }

    /// Counted toward the accuracy percentage.
    pub fn is_hit(self) -> bool {
        self != Accuracy::Miss
    }

    pub fn extends_combo(self) -> bool {
        matches!(self, Accuracy::Perfect | Accuracy::Good)
    }

    pub fn base_points(self, scoring: &ScoringConfig) -> u32 {
        match self {
            Accuracy::Perfect => scoring.perfect_points,
            Accuracy::Good => scoring.good_points,
            Accuracy::Fair => scoring.fair_points,
            Accuracy::Miss => scoring.miss_points,
        }
    }
}

pub fn classify(error_ms: f64, thresholds: &TimingThresholds) -> Accuracy {
    if error_ms <= thresholds.perfect_ms {
        Accuracy::Perfect
    } else if error_ms <= thresholds.good_ms {
        Accuracy::Good
    } else if error_ms <= thresholds.fair_ms {
        Accuracy::Fair
    } else {
        Accuracy::Miss
    }
}

/// In-measure beat position of a tap `relative_time` seconds after the
/// measure origin.
pub fn tap_beat_position(relative_time: f64, beat_duration: f64, beats_per_measure: u8) -> f64 {
    (relative_time / beat_duration).rem_euclid(beats_per_measure as f64)
}

/// Timing error in milliseconds between a tap and an expected onset.
pub fn timing_error_ms(
    relative_time: f64,
    expected_beat: f64,
    beat_duration: f64,
    beats_per_measure: u8,
) -> f64 {
    let tap_beat = tap_beat_position(relative_time, beat_duration, beats_per_measure);
    circular_beat_distance(tap_beat, expected_beat, beats_per_measure as f64) * beat_duration * 1000.0
}

/// Measure geometry shared by every onset of one evaluation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeasureTiming {
    pub beat_duration: f64,
    pub beats_per_measure: u8,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OnsetResult {
    pub expected_beat: f64,
    /// Index into the tap list of the best match.
    pub tap_index: Option<usize>,
    pub error_ms: Option<f64>,
    pub accuracy: Accuracy,
    pub points: u32,
    pub combo: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasureEvaluation {
    pub onsets: Vec<OnsetResult>,
    pub perfect: u32,
    pub good: u32,
    pub fair: u32,
    pub miss: u32,
    pub score: u32,
    pub max_combo: u32,
    pub final_combo: u32,
    pub accuracy_percentage: f64,
    pub passed: bool,
}

impl MeasureEvaluation {
    pub fn expected_onsets(&self) -> usize {
        self.onsets.len()
    }

    pub fn hits(&self) -> u32 {
        self.perfect + self.good + self.fair
    }
}

/// Matches each expected onset to its closest tap and scores the measure.
/// A tap may be the best match for more than one onset.
#[instrument(skip_all, fields(onsets = expected_beats.len(), taps = tap_times.len()))]
pub fn evaluate_measure(
    expected_beats: &[f64],
    tap_times: &[f64],
    timing: MeasureTiming,
    thresholds: &TimingThresholds,
    scoring: &ScoringConfig,
) -> MeasureEvaluation {
    let mut evaluation = MeasureEvaluation::default();
    if expected_beats.is_empty() {
        warn!("evaluating a measure with no expected onsets");
        return evaluation;
    }

    let mut combo = 0u32;
    for &expected_beat in expected_beats {
        let best = tap_times
            .iter()
            .enumerate()
            .map(|(index, &t)| {
                let error = timing_error_ms(
                    t,
                    expected_beat,
                    timing.beat_duration,
                    timing.beats_per_measure,
                );
                (index, error, classify(error, thresholds))
            })
            .min_by(|a, b| {
                b.2.rank()
                    .cmp(&a.2.rank())
                    .then_with(|| a.1.total_cmp(&b.1))
            });

        let (tap_index, error_ms, accuracy) = match best {
            Some((index, error, accuracy)) => (Some(index), Some(error), accuracy),
            None => (None, None, Accuracy::Miss),
        };

        if accuracy.extends_combo() {
            combo += 1;
        } else {
            combo = 0;
        }
        let base = accuracy.base_points(scoring);
        let points = if combo >= scoring.combo_threshold {
            (base as f64 * scoring.combo_multiplier).round() as u32
        } else {
            base
        };

        match accuracy {
            Accuracy::Perfect => evaluation.perfect += 1,
            Accuracy::Good => evaluation.good += 1,
            Accuracy::Fair => evaluation.fair += 1,
            Accuracy::Miss => evaluation.miss += 1,
        }
        evaluation.score += points;
        evaluation.max_combo = evaluation.max_combo.max(combo);
        evaluation.onsets.push(OnsetResult {
            expected_beat,
            tap_index,
            error_ms,
            accuracy,
            points,
            combo,
        });
    }

    evaluation.final_combo = combo;
    evaluation.accuracy_percentage =
        evaluation.hits() as f64 / expected_beats.len() as f64 * 100.0;
    evaluation.passed = evaluation.accuracy_percentage >= scoring.pass_percentage;
    evaluation
}

/// Immediate judgement of a single tap against the nearest expected onset.
pub fn preview_tap(
    relative_time: f64,
    expected_beats: &[f64],
    timing: MeasureTiming,
    thresholds: &TimingThresholds,
) -> Option<(Accuracy, f64)> {
    expected_beats
        .iter()
        .map(|&beat| {
            timing_error_ms(
                relative_time,
                beat,
                timing.beat_duration,
                timing.beats_per_measure,
            )
        })
        .min_by(f64::total_cmp)
        .map(|error| (classify(error, thresholds), error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thresholds::calculate_timing_thresholds;
    use metra_domain::{Difficulty, Pattern, TimeSignatureId};

    const QUARTERS: [f64; 4] = [0.0, 1.0, 2.0, 3.0];

    fn timing(tempo: f64) -> MeasureTiming {
        MeasureTiming {
            beat_duration: 60.0 / tempo,
            beats_per_measure: 4,
        }
    }

    #[test]
    fn classification_boundaries_are_inclusive() {
        let t = calculate_timing_thresholds(120.0);
        assert_eq!(classify(50.0, &t), Accuracy::Perfect);
        assert_eq!(classify(75.0, &t), Accuracy::Good);
        assert_eq!(classify(125.0, &t), Accuracy::Fair);
        assert_eq!(classify(125.1, &t), Accuracy::Miss);
    }

    #[test]
    fn four_taps_on_the_beat() {
        let taps: Vec<f64> = QUARTERS.iter().map(|b| b * 0.5).collect();
        let eval = evaluate_measure(
            &QUARTERS,
            &taps,
            timing(120.0),
            &calculate_timing_thresholds(120.0),
            &ScoringConfig::default(),
        );
        assert_eq!(eval.perfect, 4);
        assert_eq!(eval.final_combo, 4);
        assert_eq!(eval.max_combo, 4);
        let points: Vec<u32> = eval.onsets.iter().map(|o| o.points).collect();
        assert_eq!(points, vec![100, 100, 120, 120]);
        assert_eq!(eval.score, 440);
        assert_eq!(eval.accuracy_percentage, 100.0);
        assert!(eval.passed);
    }

    #[test]
    fn missing_last_tap() {
        let taps = [0.0, 0.5, 1.0];
        let eval = evaluate_measure(
            &QUARTERS,
            &taps,
            timing(120.0),
            &calculate_timing_thresholds(120.0),
            &ScoringConfig::default(),
        );
        assert_eq!((eval.perfect, eval.miss), (3, 1));
        assert_eq!(eval.final_combo, 0);
        assert_eq!(eval.max_combo, 3);
        assert_eq!(eval.onsets[3].combo, 0);
        assert_eq!(eval.accuracy_percentage, 75.0);
    }

    #[test]
    fn no_taps_is_all_miss() {
        let eval = evaluate_measure(
            &QUARTERS,
            &[],
            timing(120.0),
            &calculate_timing_thresholds(120.0),
            &ScoringConfig::default(),
        );
        assert_eq!(eval.miss, 4);
        assert_eq!(eval.score, 0);
        assert!(!eval.passed);
    }

    #[test]
    fn empty_expectation_scores_zero() {
        let eval = evaluate_measure(
            &[],
            &[0.0],
            timing(120.0),
            &calculate_timing_thresholds(120.0),
            &ScoringConfig::default(),
        );
        assert_eq!(eval.expected_onsets(), 0);
        assert_eq!(eval.accuracy_percentage, 0.0);
        assert!(!eval.passed);
    }

    #[test]
    fn midpoint_between_onsets_misses() {
        for difficulty in Difficulty::ALL {
            let pattern = Pattern::fallback(TimeSignatureId::FourFour, difficulty);
            let expected = pattern.onset_beats();
            for tempo in 100..=180 {
                let timing = timing(tempo as f64);
                let tap = 1.5 * timing.beat_duration;
                let (accuracy, _) =
                    preview_tap(tap, &expected, timing, &calculate_timing_thresholds(tempo as f64))
                        .unwrap();
                assert_eq!(accuracy, Accuracy::Miss, "tempo {tempo}");
            }
        }
    }

    #[test]
    fn wraps_across_the_barline() {
        // A tap just before the next downbeat counts for onset 0.
        let t = timing(120.0);
        let err = timing_error_ms(1.98, 0.0, t.beat_duration, t.beats_per_measure);
        assert!((err - 20.0).abs() < 1e-6);
        let err = timing_error_ms(-0.03, 0.0, t.beat_duration, t.beats_per_measure);
        assert!((err - 30.0).abs() < 1e-6);
    }

    #[test]
    fn combo_resets_on_fair() {
        let taps = [0.0, 0.5, 1.0 + 0.1, 1.5];
        let eval = evaluate_measure(
            &QUARTERS,
            &taps,
            timing(120.0),
            &calculate_timing_thresholds(120.0),
            &ScoringConfig::default(),
        );
        let accuracies: Vec<Accuracy> = eval.onsets.iter().map(|o| o.accuracy).collect();
        assert_eq!(
            accuracies,
            vec![Accuracy::Perfect, Accuracy::Perfect, Accuracy::Fair, Accuracy::Perfect]
        );
        assert_eq!(eval.onsets[2].combo, 0);
        assert_eq!(eval.onsets[3].points, 100);
        assert_eq!(eval.max_combo, 2);
    }
}
