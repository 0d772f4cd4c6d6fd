//! Hybrid pattern source: curated libraries first, rule-based generation
//! otherwise, with a deterministic fallback behind both.

use metra_domain::pattern::{is_valid_binary, rest_fraction};
use metra_domain::{
    Difficulty, DomainError, Pattern, PatternSource, TimeSignature, TimeSignatureId,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{debug, instrument, warn};

use crate::config::PatternConfig;
use crate::library::PatternLibrary;

const SUBDIVISION_PROBABILITY: f64 = 0.3;
const MEDIUM_BEAT_FACTOR: f64 = 0.7;
const DENSITY_WINDOW: usize = 4;
const MAX_LOCAL_DENSITY: f64 = 0.5;

/// Musical constraints for procedural generation at one difficulty.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRules {
    pub min_rest: f64,
    pub max_rest: f64,
    pub strong_beat_probability: f64,
    pub weak_beat_probability: f64,
}

static BEGINNER_RULES: GenerationRules = GenerationRules {
    min_rest: 0.2,
    max_rest: 0.6,
    strong_beat_probability: 0.8,
    weak_beat_probability: 0.3,
};

static INTERMEDIATE_RULES: GenerationRules = GenerationRules {
    min_rest: 0.1,
    max_rest: 0.5,
    strong_beat_probability: 0.7,
    weak_beat_probability: 0.5,
};

static ADVANCED_RULES: GenerationRules = GenerationRules {
    min_rest: 0.05,
    max_rest: 0.4,
    strong_beat_probability: 0.6,
    weak_beat_probability: 0.6,
};

impl GenerationRules {
    pub fn for_difficulty(difficulty: Difficulty) -> &'static GenerationRules {
        match difficulty {
            Difficulty::Beginner => &BEGINNER_RULES,
            Difficulty::Intermediate => &INTERMEDIATE_RULES,
            Difficulty::Advanced => &ADVANCED_RULES,
        }
    }
}

/// Onset density over `[position - window/2, position + window/2)`.
fn local_density(steps: &[u8], position: usize, window: usize) -> f64 {
    let start = position.saturating_sub(window / 2);
    let end = (position + window.div_ceil(2)).min(steps.len());
    if end <= start {
        return 0.0;
    }
    let onsets = steps[start..end].iter().filter(|&&s| s == 1).count();
    onsets as f64 / (end - start) as f64
}

fn beat_slots(sig: &TimeSignature, beats: &[u8]) -> Vec<usize> {
    beats.iter().map(|&b| sig.beat_slot(b)).collect()
}

fn half_beat_slots(sig: &TimeSignature) -> Vec<usize> {
    let per_beat = sig.subdivisions_per_beat() as usize;
    if per_beat < 2 || per_beat % 2 != 0 {
        return Vec::new();
    }
    (0..sig.beats_per_measure)
        .map(|b| sig.beat_slot(b) + per_beat / 2)
        .collect()
}

/// Candidate steps for adding onsets when a pattern has too many rests,
/// strongest tier first. Order within a tier is left to the caller.
fn fill_tiers(sig: &TimeSignature) -> Vec<Vec<usize>> {
    let mut tiers = vec![
        beat_slots(sig, sig.strong_beats),
        beat_slots(sig, sig.medium_beats),
        beat_slots(sig, sig.weak_beats),
        half_beat_slots(sig),
    ];
    let placed: Vec<usize> = tiers.iter().flatten().copied().collect();
    tiers.push(
        (0..sig.subdivisions_per_measure as usize)
            .filter(|s| !placed.contains(s))
            .collect(),
    );
    tiers
}

/// Candidate steps for removing onsets when a pattern is too dense, weakest
/// tier first. Strong and medium beats are never removed.
fn thin_tiers(sig: &TimeSignature) -> Vec<Vec<usize>> {
    let len = sig.subdivisions_per_measure as usize;
    let halves = half_beat_slots(sig);
    let off_beats: Vec<usize> = (0..len)
        .filter(|&s| !sig.is_downbeat_slot(s) && !halves.contains(&s))
        .collect();
    let mut weak = beat_slots(sig, sig.weak_beats);
    weak.retain(|&s| s != 0);
    vec![off_beats, halves, weak]
}

/// Builds one measure under the difficulty's rules. Always the signature's
/// length.
pub fn generate_steps<R: Rng>(
    rng: &mut R,
    sig: &TimeSignature,
    difficulty: Difficulty,
) -> Vec<u8> {
    let rules = GenerationRules::for_difficulty(difficulty);
    let len = sig.subdivisions_per_measure as usize;
    let mut steps = vec![0u8; len];

    for slot in beat_slots(sig, sig.strong_beats) {
        if rng.gen_bool(rules.strong_beat_probability) {
            steps[slot] = 1;
        }
    }
    for slot in beat_slots(sig, sig.medium_beats) {
        if rng.gen_bool(rules.strong_beat_probability * MEDIUM_BEAT_FACTOR) {
            steps[slot] = 1;
        }
    }
    for slot in beat_slots(sig, sig.weak_beats) {
        if rng.gen_bool(rules.weak_beat_probability) {
            steps[slot] = 1;
        }
    }

    for slot in (1..len).step_by(2) {
        if steps[slot] == 0
            && rng.gen_bool(SUBDIVISION_PROBABILITY)
            && local_density(&steps, slot, DENSITY_WINDOW) < MAX_LOCAL_DENSITY
        {
            steps[slot] = 1;
        }
    }

    apply_safeguards(rng, &mut steps, sig, difficulty, rules);
    steps
}

fn apply_safeguards<R: Rng>(
    rng: &mut R,
    steps: &mut [u8],
    sig: &TimeSignature,
    difficulty: Difficulty,
    rules: &GenerationRules,
) {
    if difficulty == Difficulty::Beginner {
        steps[0] = 1;
    }

    if rest_fraction(steps) > rules.max_rest {
        'fill: for mut tier in fill_tiers(sig) {
            tier.shuffle(rng);
            for slot in tier {
                if rest_fraction(steps) <= rules.max_rest {
                    break 'fill;
                }
                steps[slot] = 1;
            }
        }
    }

    if rest_fraction(steps) < rules.min_rest {
        'thin: for mut tier in thin_tiers(sig) {
            tier.shuffle(rng);
            for slot in tier {
                if rest_fraction(steps) >= rules.min_rest {
                    break 'thin;
                }
                steps[slot] = 0;
            }
        }
    }
}

/// Produces the pattern for each exercise.
#[derive(Debug)]
pub struct PatternGenerator {
    rng: StdRng,
    library: PatternLibrary,
}

impl PatternGenerator {
    pub fn new(library: PatternLibrary, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng, library }
    }

    pub fn from_config(config: &PatternConfig) -> Self {
        let library = match &config.library_dir {
            Some(dir) => PatternLibrary::from_dir(dir),
            None => PatternLibrary::embedded(),
        };
        Self::new(library, config.seed)
    }

    pub fn library(&self) -> &PatternLibrary {
        &self.library
    }

    /// Pattern for a time signature given by name. Unknown names are an
    /// error; everything else recovers to a valid pattern.
    #[instrument(skip(self))]
    pub fn get_pattern(
        &mut self,
        time_signature: &str,
        difficulty: Difficulty,
        prefer_curated: bool,
    ) -> Result<Pattern, DomainError> {
        let id = TimeSignatureId::from_name(time_signature)?;
        Ok(self.get_pattern_for(id, difficulty, prefer_curated))
    }

    pub fn get_pattern_for(
        &mut self,
        time_signature: TimeSignatureId,
        difficulty: Difficulty,
        prefer_curated: bool,
    ) -> Pattern {
        if prefer_curated {
            if let Some(pattern) = self.curated_pattern(time_signature, difficulty) {
                return finalize(pattern);
            }
            debug!(%time_signature, %difficulty, "no curated pattern, generating");
        }
        self.generate(time_signature, difficulty)
    }

    /// A random entry from the curated bucket, if there is one.
    pub fn curated_pattern(
        &mut self,
        time_signature: TimeSignatureId,
        difficulty: Difficulty,
    ) -> Option<Pattern> {
        let patterns = self.library.patterns(time_signature, difficulty);
        patterns.choose(&mut self.rng).cloned()
    }

    pub fn generate(&mut self, time_signature: TimeSignatureId, difficulty: Difficulty) -> Pattern {
        let steps = generate_steps(&mut self.rng, time_signature.definition(), difficulty);
        match Pattern::new(steps, time_signature, difficulty, PatternSource::Generated) {
            Ok(pattern) => finalize(pattern),
            Err(err) => {
                warn!(%time_signature, error = %err, "generated pattern invalid, using fallback");
                Pattern::fallback(time_signature, difficulty)
            }
        }
    }

    /// `count` patterns alternating between curated and generated sources.
    pub fn generate_practice_set(
        &mut self,
        time_signature: TimeSignatureId,
        difficulty: Difficulty,
        count: usize,
    ) -> Vec<Pattern> {
        (0..count)
            .map(|i| self.get_pattern_for(time_signature, difficulty, i % 2 == 0))
            .collect()
    }
}

impl Default for PatternGenerator {
    fn default() -> Self {
        Self::new(PatternLibrary::embedded(), None)
    }
}

/// Last check before a pattern reaches playback.
fn finalize(pattern: Pattern) -> Pattern {
    let sig = pattern.signature();
    if is_valid_binary(pattern.steps(), sig) && pattern.onset_count() > 0 {
        return pattern;
    }
    warn!(
        time_signature = %pattern.time_signature,
        source = ?pattern.source,
        "pattern failed final validation, using fallback"
    );
    Pattern::fallback(pattern.time_signature, pattern.difficulty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{LibraryLoader, LibrarySource};
    use std::collections::HashSet;

    #[derive(Debug)]
    struct EmptyLoader;

    impl LibraryLoader for EmptyLoader {
        fn load(&self, _: TimeSignatureId) -> anyhow::Result<Option<LibrarySource>> {
            Ok(None)
        }
    }

    fn generated_only(seed: u64) -> PatternGenerator {
        PatternGenerator::new(PatternLibrary::new(Box::new(EmptyLoader)), Some(seed))
    }

    #[test]
    fn every_pattern_has_exact_binary_length() {
        let mut generator = PatternGenerator::new(PatternLibrary::embedded(), Some(11));
        for id in TimeSignatureId::ALL {
            for difficulty in Difficulty::ALL {
                for prefer_curated in [true, false] {
                    for _ in 0..50 {
                        let pattern = generator.get_pattern_for(id, difficulty, prefer_curated);
                        assert_eq!(pattern.len(), id.definition().subdivisions_per_measure as usize);
                        assert!(pattern.steps().iter().all(|&s| s <= 1));
                    }
                }
            }
        }
    }

    #[test]
    fn generated_rest_fraction_stays_in_band() {
        let mut generator = generated_only(7);
        for id in TimeSignatureId::ALL {
            for difficulty in Difficulty::ALL {
                let rules = GenerationRules::for_difficulty(difficulty);
                for _ in 0..1000 {
                    let pattern = generator.generate(id, difficulty);
                    let rest = pattern.rest_fraction();
                    assert!(
                        rest >= rules.min_rest && rest <= rules.max_rest,
                        "{id} {difficulty}: rest {rest} in {:?}",
                        pattern.steps()
                    );
                }
            }
        }
    }

    #[test]
    fn beginner_always_starts_on_the_downbeat() {
        let mut generator = generated_only(3);
        for id in TimeSignatureId::ALL {
            for _ in 0..200 {
                assert_eq!(generator.generate(id, Difficulty::Beginner).steps()[0], 1);
            }
        }
    }

    #[test]
    fn unsupported_signature_is_an_error() {
        let mut generator = PatternGenerator::default();
        let result = generator.get_pattern("7/8", Difficulty::Beginner, true);
        assert!(matches!(result, Err(DomainError::UnsupportedTimeSignature(name)) if name == "7/8"));
    }

    #[test]
    fn curated_preference_uses_library() {
        let mut generator = PatternGenerator::new(PatternLibrary::embedded(), Some(5));
        let pattern = generator.get_pattern("3/4", Difficulty::Intermediate, true).unwrap();
        assert_eq!(pattern.source, PatternSource::Curated);

        let generated = generator.get_pattern("3/4", Difficulty::Intermediate, false).unwrap();
        assert_eq!(generated.source, PatternSource::Generated);
    }

    #[test]
    fn missing_library_falls_through_to_generation() {
        let mut generator = generated_only(1);
        let pattern = generator.get_pattern_for(TimeSignatureId::SixEight, Difficulty::Advanced, true);
        assert_eq!(pattern.source, PatternSource::Generated);
    }

    #[test]
    fn seeded_generators_repeat() {
        let a: Vec<_> = generated_only(42)
            .generate_practice_set(TimeSignatureId::FourFour, Difficulty::Advanced, 5)
            .into_iter()
            .map(|p| p.steps().to_vec())
            .collect();
        let b: Vec<_> = generated_only(42)
            .generate_practice_set(TimeSignatureId::FourFour, Difficulty::Advanced, 5)
            .into_iter()
            .map(|p| p.steps().to_vec())
            .collect();
        assert_eq!(a, b);
    }

    #[test]
    fn practice_set_alternates_sources() {
        let mut generator = PatternGenerator::new(PatternLibrary::embedded(), Some(9));
        let set = generator.generate_practice_set(TimeSignatureId::FourFour, Difficulty::Beginner, 4);
        let sources: Vec<_> = set.iter().map(|p| p.source).collect();
        assert_eq!(
            sources,
            vec![
                PatternSource::Curated,
                PatternSource::Generated,
                PatternSource::Curated,
                PatternSource::Generated
            ]
        );
    }

    #[test]
    fn every_difficulty_varies_per_signature() {
        let mut rng = StdRng::seed_from_u64(17);
        for id in TimeSignatureId::ALL {
            for difficulty in Difficulty::ALL {
                let distinct: HashSet<Vec<u8>> = (0..500)
                    .map(|_| generate_steps(&mut rng, id.definition(), difficulty))
                    .collect();
                assert!(distinct.len() > 5, "{id} {difficulty}: {} patterns", distinct.len());
            }
        }
    }

    #[test]
    fn beginner_gets_off_beat_onsets() {
        let mut rng = StdRng::seed_from_u64(99);
        let sig = TimeSignatureId::FourFour.definition();
        let off_beat_measures = (0..200)
            .map(|_| generate_steps(&mut rng, sig, Difficulty::Beginner))
            .filter(|steps| steps.iter().skip(1).step_by(2).any(|&s| s == 1))
            .count();
        assert!(off_beat_measures > 0);
    }

    #[test]
    fn off_beats_spread_across_the_measure() {
        let mut rng = StdRng::seed_from_u64(23);
        let sig = TimeSignatureId::FourFour.definition();
        let mut late = 0;
        for _ in 0..500 {
            let steps = generate_steps(&mut rng, sig, Difficulty::Advanced);
            if steps[9..].iter().step_by(2).any(|&s| s == 1) {
                late += 1;
            }
        }
        assert!(late > 100, "only {late} measures with a late off-beat");
    }

    #[test]
    fn safeguards_fill_the_strong_beat_first() {
        let mut rng = StdRng::seed_from_u64(5);
        let sig = TimeSignatureId::SixEight.definition();
        let rules = GenerationRules::for_difficulty(Difficulty::Intermediate);
        for _ in 0..100 {
            let mut steps = vec![0u8; 12];
            apply_safeguards(&mut rng, &mut steps, sig, Difficulty::Intermediate, rules);
            for strong in beat_slots(sig, sig.strong_beats) {
                assert_eq!(steps[strong], 1, "{steps:?}");
            }
            assert!(rest_fraction(&steps) <= rules.max_rest);
        }
    }

    #[test]
    fn thinning_keeps_strong_and_medium_beats() {
        let mut rng = StdRng::seed_from_u64(8);
        let sig = TimeSignatureId::FourFour.definition();
        let rules = GenerationRules::for_difficulty(Difficulty::Beginner);
        let mut steps = vec![1u8; 16];
        apply_safeguards(&mut rng, &mut steps, sig, Difficulty::Beginner, rules);
        assert!(rest_fraction(&steps) >= rules.min_rest);
        for slot in beat_slots(sig, sig.strong_beats)
            .into_iter()
            .chain(beat_slots(sig, sig.medium_beats))
        {
            assert_eq!(steps[slot], 1);
        }
    }

    #[test]
    fn density_window_is_half_open() {
        let steps = [1, 1, 0, 0, 0, 0];
        assert_eq!(local_density(&steps, 2, 4), 0.5);
        assert_eq!(local_density(&steps, 0, 4), 1.0);
    }
}
