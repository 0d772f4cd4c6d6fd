use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use metra_domain::{Difficulty, LibraryFormat, PatternDatabase, TimeSignatureId};
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Validate curated rhythm pattern libraries"
)]
struct Args {
    /// Library files, or directories holding `<n>-<d>.json|yaml` files
    #[arg(required = true)]
    paths: Vec<PathBuf>,
    /// Print reports as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct BucketReport {
    difficulty: Difficulty,
    patterns: usize,
    /// Entries written in the legacy fractional encoding.
    converted: usize,
    average_complexity: f64,
    average_rest_fraction: f64,
}

#[derive(Debug, Serialize)]
struct LibraryReport {
    path: PathBuf,
    time_signature: TimeSignatureId,
    buckets: Vec<BucketReport>,
}

fn collect_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = fs::read_dir(path)
                .with_context(|| format!("reading {}", path.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && LibraryFormat::from_path(p).is_some())
                .collect();
            found.sort();
            files.extend(found);
        } else {
            files.push(path.clone());
        }
    }
    Ok(files)
}

/// The file stem names the signature ("6-8" is 6/8); the `timeSignature`
/// field is used when the stem does not.
fn detect_signature(path: &Path, database: &PatternDatabase) -> Result<TimeSignatureId> {
    let from_stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .and_then(|stem| TimeSignatureId::from_name(&stem.replace('-', "/")).ok());
    match from_stem {
        Some(id) => Ok(id),
        None => TimeSignatureId::from_name(&database.time_signature)
            .map_err(|err| anyhow!("cannot tell the time signature: {err}")),
    }
}

fn lint_text(path: &Path, text: &str, format: LibraryFormat) -> Result<LibraryReport> {
    let database = PatternDatabase::parse(text, format)?;
    let time_signature = detect_signature(path, &database)?;
    database.validate(time_signature)?;

    let mut buckets = Vec::with_capacity(Difficulty::ALL.len());
    for difficulty in Difficulty::ALL {
        let patterns = database.patterns(time_signature, difficulty)?;
        if patterns.is_empty() {
            bail!("{difficulty} bucket is empty");
        }
        let count = patterns.len() as f64;
        buckets.push(BucketReport {
            difficulty,
            patterns: patterns.len(),
            converted: patterns.iter().filter(|p| p.converted).count(),
            average_complexity: round2(patterns.iter().map(|p| p.complexity()).sum::<f64>() / count),
            average_rest_fraction: round2(
                patterns.iter().map(|p| p.rest_fraction()).sum::<f64>() / count,
            ),
        });
    }
    Ok(LibraryReport {
        path: path.to_path_buf(),
        time_signature,
        buckets,
    })
}

fn lint_file(path: &Path) -> Result<LibraryReport> {
    let format = LibraryFormat::from_path(path)
        .ok_or_else(|| anyhow!("unknown library format, expected .json or .yaml"))?;
    let text = fs::read_to_string(path)?;
    lint_text(path, &text, format)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn print_report(report: &LibraryReport) {
    println!("{} ({})", report.path.display(), report.time_signature);
    for bucket in &report.buckets {
        println!(
            "  {:<12} {:>3} patterns  complexity {:>4.2}  rests {:>3.0}%{}",
            bucket.difficulty.as_str(),
            bucket.patterns,
            bucket.average_complexity,
            bucket.average_rest_fraction * 100.0,
            if bucket.converted > 0 {
                format!("  ({} legacy)", bucket.converted)
            } else {
                String::new()
            }
        );
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let files = collect_files(&args.paths)?;
    info!(count = files.len(), "linting pattern libraries");

    let mut reports = Vec::new();
    let mut failures = 0;
    for file in &files {
        match lint_file(file) {
            Ok(report) => reports.push(report),
            Err(err) => {
                failures += 1;
                error!(path = %file.display(), "{err:#}");
                eprintln!("{}: {err:#}", file.display());
            }
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        reports.iter().for_each(print_report);
    }

    if failures > 0 {
        bail!("{failures} of {} libraries failed", files.len());
    }
    println!("{} libraries ok", reports.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const THREE_FOUR: &str = r#"{
        "timeSignature": "3/4",
        "patterns": {
            "beginner": [[1,0,0,0,1,0,0,0,1,0,0,0]],
            "intermediate": [[{"duration": "half", "note": true}, {"duration": "quarter", "note": false}]],
            "advanced": [[1,0,1,1,0,0,1,0,1,0,0,1]]
        }
    }"#;

    #[test]
    fn reports_every_bucket() {
        let report = lint_text(Path::new("3-4.json"), THREE_FOUR, LibraryFormat::Json).unwrap();
        assert_eq!(report.time_signature, TimeSignatureId::ThreeFour);
        assert_eq!(report.buckets.len(), 3);
        assert!(report.buckets.iter().all(|b| b.patterns == 1));
        assert_eq!(report.buckets[0].average_rest_fraction, 0.75);
    }

    #[test]
    fn signature_falls_back_to_the_document() {
        let report = lint_text(Path::new("waltz.json"), THREE_FOUR, LibraryFormat::Json).unwrap();
        assert_eq!(report.time_signature, TimeSignatureId::ThreeFour);
    }

    #[test]
    fn stem_and_document_must_agree() {
        assert!(lint_text(Path::new("4-4.json"), THREE_FOUR, LibraryFormat::Json).is_err());
    }

    #[test]
    fn wrong_length_entry_fails() {
        let broken = THREE_FOUR.replace("[1,0,0,0,1,0,0,0,1,0,0,0]", "[1,0,0,0,1,0,0,0]");
        assert!(lint_text(Path::new("3-4.json"), &broken, LibraryFormat::Json).is_err());
    }

    #[test]
    fn empty_bucket_fails() {
        let broken = THREE_FOUR.replace("[[1,0,1,1,0,0,1,0,1,0,0,1]]", "[]");
        let err = lint_text(Path::new("3-4.json"), &broken, LibraryFormat::Json).unwrap_err();
        assert!(err.to_string().contains("advanced"));
    }

    #[test]
    fn bundled_libraries_pass() {
        let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../crates/trainer/data/patterns");
        let files = collect_files(&[dir]).unwrap();
        assert_eq!(files.len(), 4);
        for file in files {
            lint_file(&file).unwrap();
        }
    }
}
