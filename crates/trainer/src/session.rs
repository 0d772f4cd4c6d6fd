use serde::{Deserialize, Serialize};

use crate::evaluator::MeasureEvaluation;

/// Running totals for one practice session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionStats {
    pub perfect: u32,
    pub good: u32,
    pub fair: u32,
    pub miss: u32,
    pub score: u32,
    pub combo: u32,
    pub max_combo: u32,
    pub exercises_completed: u32,
    pub per_exercise_scores: Vec<f64>,
    pub expected_onsets: u32,
}

impl SessionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, evaluation: &MeasureEvaluation) {
        self.perfect += evaluation.perfect;
        self.good += evaluation.good;
        self.fair += evaluation.fair;
        self.miss += evaluation.miss;
        self.score += evaluation.score;
        self.combo = evaluation.final_combo;
        self.max_combo = self.max_combo.max(evaluation.max_combo);
        self.expected_onsets += evaluation.expected_onsets() as u32;
        self.exercises_completed += 1;
        self.per_exercise_scores
            .push(evaluation.accuracy_percentage.round());
    }

    /// Matched onsets over every expected onset of the session.
    pub fn final_score_percentage(&self) -> f64 {
        if self.expected_onsets == 0 {
            return 0.0;
        }
        let hits = self.perfect + self.good + self.fair;
        (hits as f64 / self.expected_onsets as f64 * 100.0).round()
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            exercises_completed: self.exercises_completed,
            final_score_percentage: self.final_score_percentage(),
            perfect_count: self.perfect,
            good_count: self.good,
            fair_count: self.fair,
            miss_count: self.miss,
            max_combo: self.max_combo,
            per_exercise_scores: self.per_exercise_scores.clone(),
            total_score: self.score,
        }
    }
}

/// Sent once when a session completes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub exercises_completed: u32,
    pub final_score_percentage: f64,
    pub perfect_count: u32,
    pub good_count: u32,
    pub fair_count: u32,
    pub miss_count: u32,
    pub max_combo: u32,
    pub per_exercise_scores: Vec<f64>,
    pub total_score: u32,
}
