use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::DomainError;

/// Metrical layout of one measure. Subdivisions are counted in pattern steps
/// (sixteenth notes for simple meters).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TimeSignature {
    pub name: &'static str,
    pub beats_per_measure: u8,
    pub subdivisions_per_measure: u8,
    pub strong_beats: &'static [u8],
    pub medium_beats: &'static [u8],
    pub weak_beats: &'static [u8],
    pub is_compound: bool,
}

impl TimeSignature {
    pub fn subdivisions_per_beat(&self) -> u8 {
        self.subdivisions_per_measure / self.beats_per_measure
    }

    /// Pattern step index of the given beat.
    pub fn beat_slot(&self, beat_index: u8) -> usize {
        beat_index as usize * self.subdivisions_per_beat() as usize
    }

    pub fn is_downbeat_slot(&self, slot: usize) -> bool {
        slot % self.subdivisions_per_beat() as usize == 0
    }
}

static FOUR_FOUR: TimeSignature = TimeSignature {
    name: "4/4",
    beats_per_measure: 4,
    subdivisions_per_measure: 16,
    strong_beats: &[0],
    medium_beats: &[2],
    weak_beats: &[1, 3],
    is_compound: false,
};

static THREE_FOUR: TimeSignature = TimeSignature {
    name: "3/4",
    beats_per_measure: 3,
    subdivisions_per_measure: 12,
    strong_beats: &[0],
    medium_beats: &[],
    weak_beats: &[1, 2],
    is_compound: false,
};

static TWO_FOUR: TimeSignature = TimeSignature {
    name: "2/4",
    beats_per_measure: 2,
    subdivisions_per_measure: 8,
    strong_beats: &[0],
    medium_beats: &[],
    weak_beats: &[1],
    is_compound: false,
};

static SIX_EIGHT: TimeSignature = TimeSignature {
    name: "6/8",
    beats_per_measure: 6,
    subdivisions_per_measure: 12,
    strong_beats: &[0, 3],
    medium_beats: &[],
    weak_beats: &[1, 2, 4, 5],
    is_compound: true,
};

/// Key into the fixed time signature catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TimeSignatureId {
    #[serde(rename = "4/4")]
    FourFour,
    #[serde(rename = "3/4")]
    ThreeFour,
    #[serde(rename = "2/4")]
    TwoFour,
    #[serde(rename = "6/8")]
    SixEight,
}

impl TimeSignatureId {
    pub const ALL: [TimeSignatureId; 4] = [
        TimeSignatureId::FourFour,
        TimeSignatureId::ThreeFour,
        TimeSignatureId::TwoFour,
        TimeSignatureId::SixEight,
    ];

    pub fn definition(self) -> &'static TimeSignature {
        match self {
            TimeSignatureId::FourFour => &FOUR_FOUR,
            TimeSignatureId::ThreeFour => &THREE_FOUR,
            TimeSignatureId::TwoFour => &TWO_FOUR,
            TimeSignatureId::SixEight => &SIX_EIGHT,
        }
    }

    pub fn name(self) -> &'static str {
        self.definition().name
    }

    /// File stem used by curated libraries ("4/4" -> "4-4").
    pub fn file_stem(self) -> String {
        self.name().replace('/', "-")
    }

    pub fn from_name(name: &str) -> Result<Self, DomainError> {
        Self::ALL
            .into_iter()
            .find(|id| id.name() == name.trim())
            .ok_or_else(|| DomainError::UnsupportedTimeSignature(name.to_string()))
    }
}

impl FromStr for TimeSignatureId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

impl fmt::Display for TimeSignatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
