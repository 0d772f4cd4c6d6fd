//! Curated pattern libraries: where they come from and the per-session cache.

use std::collections::HashMap;
use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use metra_domain::{Difficulty, LibraryFormat, Pattern, PatternDatabase, TimeSignatureId};
use tracing::{debug, instrument, warn};

/// Raw library text and how to parse it.
#[derive(Debug, Clone)]
pub struct LibrarySource {
    pub text: String,
    pub format: LibraryFormat,
    pub origin: String,
}

/// Supplies the raw curated database for a time signature.
pub trait LibraryLoader: Send + Debug {
    /// `Ok(None)` when no library exists for the signature.
    fn load(&self, time_signature: TimeSignatureId) -> Result<Option<LibrarySource>>;
}

/// Libraries compiled into the binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmbeddedLoader;

impl LibraryLoader for EmbeddedLoader {
    fn load(&self, time_signature: TimeSignatureId) -> Result<Option<LibrarySource>> {
        let text = match time_signature {
            TimeSignatureId::FourFour => include_str!("../data/patterns/4-4.json"),
            TimeSignatureId::ThreeFour => include_str!("../data/patterns/3-4.json"),
            TimeSignatureId::TwoFour => include_str!("../data/patterns/2-4.json"),
            TimeSignatureId::SixEight => include_str!("../data/patterns/6-8.json"),
        };
        Ok(Some(LibrarySource {
            text: text.to_string(),
            format: LibraryFormat::Json,
            origin: format!("embedded:{}", time_signature.file_stem()),
        }))
    }
}

/// Reads `<n>-<d>.json`, `.yaml` or `.yml` from a directory.
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    root: PathBuf,
}

impl DirectoryLoader {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn candidates(&self, time_signature: TimeSignatureId) -> impl Iterator<Item = PathBuf> + '_ {
        let stem = time_signature.file_stem();
        ["json", "yaml", "yml"]
            .into_iter()
            .map(move |ext| self.root.join(format!("{stem}.{ext}")))
    }
}

impl LibraryLoader for DirectoryLoader {
    fn load(&self, time_signature: TimeSignatureId) -> Result<Option<LibrarySource>> {
        for path in self.candidates(time_signature) {
            if !path.is_file() {
                continue;
            }
            let Some(format) = LibraryFormat::from_path(&path) else {
                continue;
            };
            let text = fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            return Ok(Some(LibrarySource {
                text,
                format,
                origin: path.display().to_string(),
            }));
        }
        Ok(None)
    }
}

/// Validated curated databases, loaded on first use and kept for the
/// session. Failed loads are cached too, so a broken file is reported once.
#[derive(Debug)]
pub struct PatternLibrary {
    loader: Box<dyn LibraryLoader>,
    cache: HashMap<TimeSignatureId, Option<PatternDatabase>>,
}

impl PatternLibrary {
    pub fn new(loader: Box<dyn LibraryLoader>) -> Self {
        Self {
            loader,
            cache: HashMap::new(),
        }
    }

    pub fn embedded() -> Self {
        Self::new(Box::new(EmbeddedLoader))
    }

    pub fn from_dir<P: Into<PathBuf>>(root: P) -> Self {
        Self::new(Box::new(DirectoryLoader::new(root)))
    }

    /// The validated database for a signature, loading it if needed.
    pub fn database(&mut self, time_signature: TimeSignatureId) -> Option<&PatternDatabase> {
        if !self.cache.contains_key(&time_signature) {
            let loaded = self.load(time_signature);
            self.cache.insert(time_signature, loaded);
        }
        self.cache.get(&time_signature).and_then(Option::as_ref)
    }

    /// Every pattern in one difficulty bucket, normalized to binary. Empty
    /// when the library is missing or invalid.
    pub fn patterns(
        &mut self,
        time_signature: TimeSignatureId,
        difficulty: Difficulty,
    ) -> Vec<Pattern> {
        let Some(database) = self.database(time_signature) else {
            return Vec::new();
        };
        match database.patterns(time_signature, difficulty) {
            Ok(patterns) => patterns,
            Err(err) => {
                warn!(%time_signature, %difficulty, error = %err, "curated bucket unusable");
                Vec::new()
            }
        }
    }

    pub fn is_cached(&self, time_signature: TimeSignatureId) -> bool {
        self.cache.contains_key(&time_signature)
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    #[instrument(skip(self))]
    fn load(&self, time_signature: TimeSignatureId) -> Option<PatternDatabase> {
        let source = match self.loader.load(time_signature) {
            Ok(Some(source)) => source,
            Ok(None) => {
                debug!("no curated library");
                return None;
            }
            Err(err) => {
                warn!(error = %err, "failed to load curated library");
                return None;
            }
        };
        let database = PatternDatabase::parse(&source.text, source.format)
            .and_then(|db| db.validate(time_signature).map(|_| db));
        match database {
            Ok(db) => {
                debug!(origin = %source.origin, entries = db.entry_count(), "curated library ready");
                Some(db)
            }
            Err(err) => {
                warn!(origin = %source.origin, error = %err, "rejecting curated library");
                None
            }
        }
    }
}

impl Default for PatternLibrary {
    fn default() -> Self {
        Self::embedded()
    }
}
