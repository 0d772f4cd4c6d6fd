use serde::{Deserialize, Serialize};

use crate::{time_signature::TimeSignature, DomainError};

pub const MIN_TEMPO_BPM: f64 = 60.0;
pub const MAX_TEMPO_BPM: f64 = 180.0;

/// Maps audio clock seconds onto beats for a fixed tempo and meter.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct BeatGrid {
    /// Clock time of beat 0.
    pub origin: f64,
    pub tempo_bpm: f64,
    pub beats_per_measure: u8,
}

impl BeatGrid {
    pub fn new(origin: f64, tempo_bpm: f64, beats_per_measure: u8) -> Result<Self, DomainError> {
        if !origin.is_finite() || origin < 0.0 {
            return Err(DomainError::validation("grid origin must be a non-negative time"));
        }
        if !(MIN_TEMPO_BPM..=MAX_TEMPO_BPM).contains(&tempo_bpm) {
            return Err(DomainError::validation(format!(
                "tempo must be between {MIN_TEMPO_BPM} and {MAX_TEMPO_BPM} bpm"
            )));
        }
        if beats_per_measure == 0 {
            return Err(DomainError::validation("measure needs at least one beat"));
        }
        Ok(Self {
            origin,
            tempo_bpm,
            beats_per_measure,
        })
    }

    pub fn for_signature(origin: f64, tempo_bpm: f64, sig: &TimeSignature) -> Result<Self, DomainError> {
        Self::new(origin, tempo_bpm, sig.beats_per_measure)
    }

    pub fn beat_duration(&self) -> f64 {
        60.0 / self.tempo_bpm
    }

    pub fn measure_duration(&self) -> f64 {
        self.beat_duration() * self.beats_per_measure as f64
    }

    /// Fractional beat count since the origin. Negative before it.
    pub fn beat_at(&self, time: f64) -> f64 {
        (time - self.origin) / self.beat_duration()
    }

    pub fn time_of_beat(&self, beat: f64) -> f64 {
        self.origin + beat * self.beat_duration()
    }

    /// Position within the measure in beats, in [0, beats_per_measure).
    pub fn beat_in_measure(&self, time: f64) -> f64 {
        self.beat_at(time).rem_euclid(self.beats_per_measure as f64)
    }

    /// First downbeat (beat 0 of a measure) strictly after `time`.
    pub fn next_downbeat_after(&self, time: f64) -> f64 {
        let measure = self.measure_duration();
        let elapsed = (time - self.origin) / measure;
        let mut index = elapsed.floor() + 1.0;
        if index < 0.0 {
            index = 0.0;
        }
        let mut candidate = self.origin + index * measure;
        while candidate <= time {
            candidate += measure;
        }
        candidate
    }

    /// Downbeat closest to `time`, never before the origin.
    pub fn nearest_downbeat(&self, time: f64) -> f64 {
        let measure = self.measure_duration();
        let index = ((time - self.origin) / measure).round().max(0.0);
        self.origin + index * measure
    }
}

/// Distance between two in-measure beat positions, wrapping at the barline.
pub fn circular_beat_distance(a: f64, b: f64, beats_per_measure: f64) -> f64 {
    let raw = (a - b).abs().rem_euclid(beats_per_measure);
    raw.min(beats_per_measure - raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn grid_validation() {
        assert!(BeatGrid::new(0.0, 59.0, 4).is_err());
        assert!(BeatGrid::new(0.0, 181.0, 4).is_err());
        assert!(BeatGrid::new(-1.0, 120.0, 4).is_err());
        assert!(BeatGrid::new(0.0, 120.0, 0).is_err());
        assert!(BeatGrid::new(0.0, 120.0, 4).is_ok());
    }

    #[test]
    fn beat_and_measure_timing() {
        let grid = BeatGrid::new(1.0, 120.0, 4).unwrap();
        assert_relative_eq!(grid.beat_duration(), 0.5);
        assert_relative_eq!(grid.measure_duration(), 2.0);
        assert_relative_eq!(grid.beat_at(2.25), 2.5);
        assert_relative_eq!(grid.time_of_beat(3.0), 2.5);
        assert_relative_eq!(grid.beat_in_measure(3.5), 1.0);
    }

    #[test]
    fn downbeat_queries() {
        let grid = BeatGrid::new(1.0, 120.0, 4).unwrap();
        assert_relative_eq!(grid.next_downbeat_after(0.2), 1.0);
        assert_relative_eq!(grid.next_downbeat_after(1.0), 3.0);
        assert_relative_eq!(grid.next_downbeat_after(2.9), 3.0);
        assert_relative_eq!(grid.nearest_downbeat(3.8), 3.0);
        assert_relative_eq!(grid.nearest_downbeat(4.2), 5.0);
        assert_relative_eq!(grid.nearest_downbeat(0.0), 1.0);
    }

    #[test]
    fn circular_distance_wraps() {
        assert_relative_eq!(circular_beat_distance(3.9, 0.0, 4.0), 0.1, epsilon = 1e-9);
        assert_relative_eq!(circular_beat_distance(0.1, 3.95, 4.0), 0.15, epsilon = 1e-9);
        assert_relative_eq!(circular_beat_distance(1.0, 2.5, 4.0), 1.5);
    }
}
