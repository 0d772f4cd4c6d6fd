use serde::{Deserialize, Serialize};

use crate::config::TimingConfig;

/// Tolerance windows in milliseconds for one tempo.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct TimingThresholds {
    pub perfect_ms: f64,
    pub good_ms: f64,
    pub fair_ms: f64,
}

impl TimingThresholds {
    /// Base windows scaled by `(reference / tempo)^exponent`: wider when slow,
    /// tighter when fast.
    pub fn for_tempo(tempo_bpm: f64, timing: &TimingConfig) -> Self {
        let factor = (timing.reference_bpm / tempo_bpm.max(1.0)).powf(timing.exponent);
        Self {
            perfect_ms: timing.perfect_ms * factor,
            good_ms: timing.good_ms * factor,
            fair_ms: timing.fair_ms * factor,
        }
    }
}

impl Default for TimingThresholds {
    fn default() -> Self {
        Self::for_tempo(120.0, &TimingConfig::default())
    }
}

pub fn calculate_timing_thresholds(tempo_bpm: f64) -> TimingThresholds {
    TimingThresholds::for_tempo(tempo_bpm, &TimingConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn reference_tempo_uses_base_profile() {
        let t = calculate_timing_thresholds(120.0);
        assert_relative_eq!(t.perfect_ms, 50.0);
        assert_relative_eq!(t.good_ms, 75.0);
        assert_relative_eq!(t.fair_ms, 125.0);
    }

    #[test]
    fn windows_shrink_as_tempo_rises() {
        let mut previous: Option<TimingThresholds> = None;
        for tempo in 60..=180 {
            let t = calculate_timing_thresholds(tempo as f64);
            assert!(t.perfect_ms < t.good_ms && t.good_ms < t.fair_ms);
            if let Some(p) = previous {
                assert!(t.perfect_ms < p.perfect_ms);
                assert!(t.good_ms < p.good_ms);
                assert!(t.fair_ms < p.fair_ms);
            }
            previous = Some(t);
        }
    }

    #[test]
    fn sixty_bpm_scales_up() {
        let t = calculate_timing_thresholds(60.0);
        assert_relative_eq!(t.perfect_ms, 50.0 * 2f64.powf(0.3), epsilon = 1e-9);
    }
}
