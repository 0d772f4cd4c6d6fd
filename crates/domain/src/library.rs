use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    difficulty::Difficulty,
    duration::NoteDuration,
    pattern::{
        fractional_to_binary, is_fractional_encoding, is_valid_binary, schema_to_binary, Pattern,
        PatternSource, SchemaNote,
    },
    time_signature::{TimeSignature, TimeSignatureId},
    DomainError,
};

const DURATION_TOLERANCE: f64 = 0.001;

/// Per-beat values accepted by the legacy fractional encoding.
const LEGACY_FRACTIONS: [f64; 10] = [
    0.0, 0.0625, 0.125, 0.166, 0.25, 0.333, 0.375, 0.5, 0.75, 1.0,
];

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum LibraryFormat {
    Json,
    Yaml,
}

impl LibraryFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "json" => Some(LibraryFormat::Json),
            "yaml" | "yml" => Some(LibraryFormat::Yaml),
            _ => None,
        }
    }
}

/// One authored pattern, in any of the accepted encodings.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum CuratedEntry {
    /// Binary steps, or legacy per-beat fractions.
    Numeric(Vec<f64>),
    Schema(Vec<SchemaNote>),
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PatternBuckets {
    pub beginner: Vec<CuratedEntry>,
    pub intermediate: Vec<CuratedEntry>,
    pub advanced: Vec<CuratedEntry>,
}

impl PatternBuckets {
    pub fn bucket(&self, difficulty: Difficulty) -> &[CuratedEntry] {
        match difficulty {
            Difficulty::Beginner => &self.beginner,
            Difficulty::Intermediate => &self.intermediate,
            Difficulty::Advanced => &self.advanced,
        }
    }
}

/// A curated pattern library for a single time signature.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PatternDatabase {
    pub time_signature: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub patterns: PatternBuckets,
}

impl PatternDatabase {
    pub fn parse(text: &str, format: LibraryFormat) -> Result<Self, DomainError> {
        match format {
            LibraryFormat::Json => serde_json::from_str(text)
                .map_err(|err| DomainError::Serialization(err.to_string())),
            LibraryFormat::Yaml => serde_yaml::from_str(text)
                .map_err(|err| DomainError::Serialization(err.to_string())),
        }
    }

    /// Checks every entry of every bucket. Any invalid entry rejects the whole
    /// database.
    pub fn validate(&self, expected: TimeSignatureId) -> Result<(), DomainError> {
        if self.time_signature.trim() != expected.name() {
            return Err(DomainError::validation(format!(
                "library is for {}, expected {}",
                self.time_signature,
                expected.name()
            )));
        }
        let sig = expected.definition();
        for difficulty in Difficulty::ALL {
            for (index, entry) in self.patterns.bucket(difficulty).iter().enumerate() {
                validate_entry(entry, sig).map_err(|err| {
                    DomainError::validation(format!("{difficulty} pattern {index}: {err}"))
                })?;
            }
        }
        debug!(time_signature = %expected, "curated library validated");
        Ok(())
    }

    /// Normalizes one bucket into binary patterns.
    pub fn patterns(
        &self,
        time_signature: TimeSignatureId,
        difficulty: Difficulty,
    ) -> Result<Vec<Pattern>, DomainError> {
        let sig = time_signature.definition();
        self.patterns
            .bucket(difficulty)
            .iter()
            .map(|entry| {
                let (steps, converted) = to_binary(entry, sig);
                let mut pattern =
                    Pattern::new(steps, time_signature, difficulty, PatternSource::Curated)?;
                pattern.converted = converted;
                Ok(pattern)
            })
            .collect()
    }

    pub fn entry_count(&self) -> usize {
        Difficulty::ALL
            .iter()
            .map(|&d| self.patterns.bucket(d).len())
            .sum()
    }
}

pub fn validate_entry(entry: &CuratedEntry, sig: &TimeSignature) -> Result<(), DomainError> {
    match entry {
        CuratedEntry::Numeric(values) if is_fractional_encoding(values) => {
            validate_fractional(values, sig)
        }
        CuratedEntry::Numeric(values) => {
            let steps: Vec<u8> = values.iter().map(|&v| v as u8).collect();
            let exact = values.iter().all(|&v| v == 0.0 || v == 1.0);
            if !exact || !is_valid_binary(&steps, sig) {
                return Err(DomainError::validation(format!(
                    "binary pattern must be {} values of 0 or 1",
                    sig.subdivisions_per_measure
                )));
            }
            Ok(())
        }
        CuratedEntry::Schema(notes) => validate_schema(notes, sig),
    }
}

fn validate_fractional(values: &[f64], sig: &TimeSignature) -> Result<(), DomainError> {
    if values.len() != sig.beats_per_measure as usize {
        return Err(DomainError::validation(format!(
            "fractional pattern must have one value per beat ({})",
            sig.beats_per_measure
        )));
    }
    let known = |v: f64| {
        LEGACY_FRACTIONS
            .iter()
            .any(|f| (v - f).abs() < DURATION_TOLERANCE)
    };
    if let Some(bad) = values.iter().find(|&&v| !known(v)) {
        return Err(DomainError::validation(format!(
            "unsupported fractional value {bad}"
        )));
    }
    if !values.iter().any(|&v| v > 0.0) {
        return Err(DomainError::validation("fractional pattern has no onsets"));
    }
    Ok(())
}

fn validate_schema(notes: &[SchemaNote], sig: &TimeSignature) -> Result<(), DomainError> {
    let mut total = 0.0;
    for note in notes {
        let duration = note.parsed_duration().ok_or_else(|| {
            DomainError::validation(format!("unknown duration '{}'", note.duration))
        })?;
        total += duration.subdivisions();
    }
    let expected = sig.subdivisions_per_measure as f64;
    if (total - expected).abs() >= DURATION_TOLERANCE {
        return Err(DomainError::validation(format!(
            "durations sum to {total:.3}, measure needs {expected}"
        )));
    }
    if !notes.iter().any(|n| n.note) {
        return Err(DomainError::validation("schema pattern has no onsets"));
    }
    Ok(())
}

/// Binary form of a validated entry, and whether it came from the legacy
/// fractional encoding.
pub fn to_binary(entry: &CuratedEntry, sig: &TimeSignature) -> (Vec<u8>, bool) {
    match entry {
        CuratedEntry::Numeric(values) if is_fractional_encoding(values) => {
            (fractional_to_binary(values, sig), true)
        }
        CuratedEntry::Numeric(values) => (values.iter().map(|&v| u8::from(v >= 1.0)).collect(), false),
        CuratedEntry::Schema(notes) => (schema_to_binary(notes, sig), false),
    }
}

/// Total notated length of a schema entry in sixteenth units.
pub fn schema_length(notes: &[SchemaNote]) -> f64 {
    notes
        .iter()
        .filter_map(SchemaNote::parsed_duration)
        .map(NoteDuration::subdivisions)
        .sum()
}
