use serde::{Deserialize, Serialize};

use crate::{
    difficulty::Difficulty,
    grid::{MAX_TEMPO_BPM, MIN_TEMPO_BPM},
    time_signature::TimeSignatureId,
    DomainError,
};

/// Time signature as sent by a setup screen.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimeSignatureInput {
    pub name: String,
    pub beats_per_measure: u8,
    pub subdivisions_per_measure: u8,
}

/// Raw settings object, validated into [`TrainerSettings`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SettingsInput {
    pub difficulty: Difficulty,
    pub time_signature: TimeSignatureInput,
    pub tempo: u32,
    #[serde(default)]
    pub adaptive_difficulty: bool,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct TrainerSettings {
    pub difficulty: Difficulty,
    pub time_signature: TimeSignatureId,
    pub tempo_bpm: u32,
    pub adaptive_difficulty: bool,
}

impl TrainerSettings {
    pub fn new(
        difficulty: Difficulty,
        time_signature: TimeSignatureId,
        tempo_bpm: u32,
    ) -> Result<Self, DomainError> {
        validate_tempo(tempo_bpm)?;
        Ok(Self {
            difficulty,
            time_signature,
            tempo_bpm,
            adaptive_difficulty: false,
        })
    }

    pub fn with_adaptive(mut self, enabled: bool) -> Self {
        self.adaptive_difficulty = enabled;
        self
    }

    pub fn from_json(json: &str) -> Result<Self, DomainError> {
        let input: SettingsInput =
            serde_json::from_str(json).map_err(|err| DomainError::Serialization(err.to_string()))?;
        Self::try_from(input)
    }
}

impl Default for TrainerSettings {
    fn default() -> Self {
        Self {
            difficulty: Difficulty::Beginner,
            time_signature: TimeSignatureId::FourFour,
            tempo_bpm: 90,
            adaptive_difficulty: false,
        }
    }
}

impl TryFrom<SettingsInput> for TrainerSettings {
    type Error = DomainError;

    fn try_from(input: SettingsInput) -> Result<Self, Self::Error> {
        let id = TimeSignatureId::from_name(&input.time_signature.name)?;
        let sig = id.definition();
        if sig.beats_per_measure != input.time_signature.beats_per_measure
            || sig.subdivisions_per_measure != input.time_signature.subdivisions_per_measure
        {
            return Err(DomainError::validation(format!(
                "time signature {} does not match the catalog layout",
                input.time_signature.name
            )));
        }
        Ok(Self::new(input.difficulty, id, input.tempo)?.with_adaptive(input.adaptive_difficulty))
    }
}

pub fn validate_tempo(tempo_bpm: u32) -> Result<(), DomainError> {
    if !(MIN_TEMPO_BPM..=MAX_TEMPO_BPM).contains(&(tempo_bpm as f64)) {
        return Err(DomainError::TempoOutOfRange(tempo_bpm));
    }
    Ok(())
}
