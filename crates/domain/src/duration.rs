use serde::{Deserialize, Serialize};

/// Notated durations accepted by curated pattern libraries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NoteDuration {
    Whole,
    Half,
    Quarter,
    Eighth,
    Sixteenth,
    DottedHalf,
    DottedQuarter,
    DottedEighth,
    QuarterTriplet,
    EighthTriplet,
    SixteenthTriplet,
}

impl NoteDuration {
    pub const ALL: [NoteDuration; 11] = [
        NoteDuration::Whole,
        NoteDuration::Half,
        NoteDuration::Quarter,
        NoteDuration::Eighth,
        NoteDuration::Sixteenth,
        NoteDuration::DottedHalf,
        NoteDuration::DottedQuarter,
        NoteDuration::DottedEighth,
        NoteDuration::QuarterTriplet,
        NoteDuration::EighthTriplet,
        NoteDuration::SixteenthTriplet,
    ];

    /// Length in sixteenth-note steps. Triplets are fractional.
    pub fn subdivisions(self) -> f64 {
        match self {
            NoteDuration::Whole => 16.0,
            NoteDuration::Half => 8.0,
            NoteDuration::Quarter => 4.0,
            NoteDuration::Eighth => 2.0,
            NoteDuration::Sixteenth => 1.0,
            NoteDuration::DottedHalf => 12.0,
            NoteDuration::DottedQuarter => 6.0,
            NoteDuration::DottedEighth => 3.0,
            NoteDuration::QuarterTriplet => 8.0 / 3.0,
            NoteDuration::EighthTriplet => 4.0 / 3.0,
            NoteDuration::SixteenthTriplet => 2.0 / 3.0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            NoteDuration::Whole => "whole",
            NoteDuration::Half => "half",
            NoteDuration::Quarter => "quarter",
            NoteDuration::Eighth => "eighth",
            NoteDuration::Sixteenth => "sixteenth",
            NoteDuration::DottedHalf => "dotted-half",
            NoteDuration::DottedQuarter => "dotted-quarter",
            NoteDuration::DottedEighth => "dotted-eighth",
            NoteDuration::QuarterTriplet => "quarter-triplet",
            NoteDuration::EighthTriplet => "eighth-triplet",
            NoteDuration::SixteenthTriplet => "sixteenth-triplet",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.name() == name)
    }

    /// Exact non-triplet duration for a whole number of steps.
    pub fn from_subdivisions(steps: usize) -> Option<Self> {
        Self::ALL
            .into_iter()
            .filter(|d| !d.is_triplet())
            .find(|d| d.subdivisions() == steps as f64)
    }

    pub fn is_triplet(self) -> bool {
        matches!(
            self,
            NoteDuration::QuarterTriplet | NoteDuration::EighthTriplet | NoteDuration::SixteenthTriplet
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for d in NoteDuration::ALL {
            assert_eq!(NoteDuration::from_name(d.name()), Some(d));
        }
        assert_eq!(NoteDuration::from_name("breve"), None);
    }

    #[test]
    fn triplets_fill_their_parent() {
        let three = NoteDuration::EighthTriplet.subdivisions() * 3.0;
        assert!((three - NoteDuration::Quarter.subdivisions()).abs() < 1e-9);
    }

    #[test]
    fn whole_steps_map_to_plain_durations() {
        assert_eq!(NoteDuration::from_subdivisions(6), Some(NoteDuration::DottedQuarter));
        assert_eq!(NoteDuration::from_subdivisions(5), None);
    }
}
