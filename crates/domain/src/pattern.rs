use serde::{Deserialize, Serialize};

use crate::{
    difficulty::Difficulty,
    duration::NoteDuration,
    time_signature::{TimeSignature, TimeSignatureId},
    DomainError,
};

/// Where a pattern came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternSource {
    Curated,
    Generated,
    Fallback,
}

/// One entry of the duration+onset schema used by curated libraries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SchemaNote {
    pub duration: String,
    /// `true` for a sounding note, `false` for a rest.
    pub note: bool,
}

impl SchemaNote {
    pub fn new(duration: NoteDuration, note: bool) -> Self {
        Self {
            duration: duration.name().to_string(),
            note,
        }
    }

    pub fn parsed_duration(&self) -> Option<NoteDuration> {
        NoteDuration::from_name(&self.duration)
    }
}

/// A contiguous note (onset followed by silence) or rest in a binary pattern.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DurationRun {
    pub is_note: bool,
    pub steps: usize,
}

/// A single measure of rhythm as binary onset markers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    steps: Vec<u8>,
    pub time_signature: TimeSignatureId,
    pub difficulty: Difficulty,
    pub source: PatternSource,
    /// Set when the pattern was converted from the legacy fractional encoding.
    #[serde(default)]
    pub converted: bool,
}

impl Pattern {
    pub fn new(
        steps: Vec<u8>,
        time_signature: TimeSignatureId,
        difficulty: Difficulty,
        source: PatternSource,
    ) -> Result<Self, DomainError> {
        let sig = time_signature.definition();
        if steps.len() != sig.subdivisions_per_measure as usize {
            return Err(DomainError::validation(format!(
                "pattern has {} steps, {} requires {}",
                steps.len(),
                sig.name,
                sig.subdivisions_per_measure
            )));
        }
        if !is_binary(&steps) {
            return Err(DomainError::validation("pattern steps must be 0 or 1"));
        }
        Ok(Self {
            steps,
            time_signature,
            difficulty,
            source,
            converted: false,
        })
    }

    /// One onset on every beat.
    pub fn fallback(time_signature: TimeSignatureId, difficulty: Difficulty) -> Self {
        let sig = time_signature.definition();
        let mut steps = vec![0u8; sig.subdivisions_per_measure as usize];
        for beat in 0..sig.beats_per_measure {
            steps[sig.beat_slot(beat)] = 1;
        }
        Self {
            steps,
            time_signature,
            difficulty,
            source: PatternSource::Fallback,
            converted: false,
        }
    }

    pub fn steps(&self) -> &[u8] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn signature(&self) -> &'static TimeSignature {
        self.time_signature.definition()
    }

    pub fn onset_count(&self) -> usize {
        self.steps.iter().filter(|&&s| s == 1).count()
    }

    pub fn rest_fraction(&self) -> f64 {
        rest_fraction(&self.steps)
    }

    /// Onset positions as fractional beat indices within the measure.
    pub fn onset_beats(&self) -> Vec<f64> {
        let per_beat = self.signature().subdivisions_per_beat() as f64;
        self.steps
            .iter()
            .enumerate()
            .filter(|(_, &s)| s == 1)
            .map(|(i, _)| i as f64 / per_beat)
            .collect()
    }

    /// Onset offsets in seconds from the start of the measure.
    pub fn onset_offsets(&self, beat_duration: f64) -> Vec<f64> {
        self.onset_beats()
            .into_iter()
            .map(|beat| beat * beat_duration)
            .collect()
    }

    /// Regroups the binary pattern into notes and rests. The step counts sum to
    /// the pattern length.
    pub fn duration_runs(&self) -> Vec<DurationRun> {
        let mut runs: Vec<DurationRun> = Vec::new();
        for &step in &self.steps {
            match runs.last_mut() {
                Some(run) if step == 0 => run.steps += 1,
                _ => runs.push(DurationRun {
                    is_note: step == 1,
                    steps: 1,
                }),
            }
        }
        runs
    }

    /// Renders the pattern in the duration+onset schema. Runs that have no
    /// single notated value are split, with the remainder written as rests.
    pub fn to_schema(&self) -> Vec<SchemaNote> {
        let mut notes = Vec::new();
        for run in self.duration_runs() {
            let mut remaining = run.steps;
            let mut sounding = run.is_note;
            while remaining > 0 {
                let (duration, steps) = largest_fitting(remaining);
                notes.push(SchemaNote::new(duration, sounding));
                remaining -= steps;
                sounding = false;
            }
        }
        notes
    }

    /// Density/syncopation score in [0, 10], one decimal.
    pub fn complexity(&self) -> f64 {
        if self.steps.is_empty() {
            return 0.0;
        }
        let onsets = self.onset_count();
        let density = onsets as f64 / self.steps.len() as f64;
        let syncopation = self.steps.iter().skip(1).step_by(2).filter(|&&s| s == 1).count();
        let bonus = if onsets > 8 { 2.0 } else { 0.0 };
        let score = (density * 4.0 + syncopation as f64 * 0.5 + bonus).min(10.0);
        (score * 10.0).round() / 10.0
    }
}

fn largest_fitting(steps: usize) -> (NoteDuration, usize) {
    (1..=steps.min(16))
        .rev()
        .find_map(|n| NoteDuration::from_subdivisions(n).map(|d| (d, n)))
        .unwrap_or((NoteDuration::Sixteenth, 1))
}

pub fn is_binary(steps: &[u8]) -> bool {
    steps.iter().all(|&s| s == 0 || s == 1)
}

/// Length and value check applied to every pattern before playback.
pub fn is_valid_binary(steps: &[u8], sig: &TimeSignature) -> bool {
    steps.len() == sig.subdivisions_per_measure as usize && is_binary(steps)
}

pub fn rest_fraction(steps: &[u8]) -> f64 {
    if steps.is_empty() {
        return 1.0;
    }
    let rests = steps.iter().filter(|&&s| s == 0).count();
    rests as f64 / steps.len() as f64
}

/// Places an onset at the rounded start position of every sounding note.
/// Unknown durations do not advance the cursor.
pub fn schema_to_binary(notes: &[SchemaNote], sig: &TimeSignature) -> Vec<u8> {
    let mut binary = vec![0u8; sig.subdivisions_per_measure as usize];
    let mut cursor = 0.0f64;
    for note in notes {
        if note.note {
            let position = cursor.round() as usize;
            if let Some(slot) = binary.get_mut(position) {
                *slot = 1;
            }
        }
        if let Some(duration) = note.parsed_duration() {
            cursor += duration.subdivisions();
        }
    }
    binary
}

/// Converts the legacy per-beat fractional encoding: an onset at each sounding
/// beat, plus one at the half beat when the value is at least 0.5.
pub fn fractional_to_binary(values: &[f64], sig: &TimeSignature) -> Vec<u8> {
    let len = sig.subdivisions_per_measure as usize;
    let per_beat = len as f64 / sig.beats_per_measure as f64;
    let mut binary = vec![0u8; len];
    for (beat, &value) in values.iter().enumerate() {
        if value <= 0.0 {
            continue;
        }
        let start = beat as f64 * per_beat;
        let position = start.floor() as usize;
        if position < len {
            binary[position] = 1;
        }
        if value >= 0.5 {
            let half = (start + per_beat / 2.0).floor() as usize;
            if half < len {
                binary[half] = 1;
            }
        }
    }
    binary
}

/// True when any value lies strictly between 0 and 1.
pub fn is_fractional_encoding(values: &[f64]) -> bool {
    values.iter().any(|&v| v > 0.0 && v < 1.0)
}
