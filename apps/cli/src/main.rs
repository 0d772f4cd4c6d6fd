mod interactive;
mod simulate;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use metra_domain::{Difficulty, TimeSignatureId, TrainerSettings};
use metra_trainer::{MeasureEvaluation, SessionSummary, TrainerConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Rhythm trainer: hear a pattern, then tap it back")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a session against a simulated performer on a manual clock
    Simulate(simulate::SimulateArgs),
    /// Practice in the terminal; press Enter on each note
    Play(interactive::PlayArgs),
}

/// Options shared by every session-driving command.
#[derive(Args, Debug, Clone)]
pub struct SessionArgs {
    /// Tempo in beats per minute (60-180)
    #[arg(long, default_value_t = 90)]
    pub tempo: u32,
    #[arg(long, default_value = "beginner")]
    pub difficulty: Difficulty,
    #[arg(long = "time-signature", default_value = "4/4")]
    pub time_signature: TimeSignatureId,
    /// Exercises before the session ends
    #[arg(long, default_value_t = 4)]
    pub exercises: u32,
    /// Move difficulty up or down with the player's results
    #[arg(long)]
    pub adaptive: bool,
    /// Seed for pattern selection and generation
    #[arg(long)]
    pub seed: Option<u64>,
    /// JSON trainer configuration
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Directory of curated pattern libraries
    #[arg(long = "library-dir")]
    pub library_dir: Option<PathBuf>,
}

impl SessionArgs {
    pub fn settings(&self) -> Result<TrainerSettings> {
        Ok(
            TrainerSettings::new(self.difficulty, self.time_signature, self.tempo)?
                .with_adaptive(self.adaptive),
        )
    }

    /// The configuration file, if any, with command-line overrides applied.
    pub fn trainer_config(&self) -> Result<TrainerConfig> {
        let mut config = match &self.config {
            Some(path) => TrainerConfig::load(path)?,
            None => TrainerConfig::default(),
        };
        if self.seed.is_some() {
            config.patterns.seed = self.seed;
        }
        if self.library_dir.is_some() {
            config.patterns.library_dir = self.library_dir.clone();
        }
        Ok(config)
    }
}

pub fn print_measure(index: u32, evaluation: &MeasureEvaluation) {
    println!(
        "exercise {index}: {:.0}% ({} perfect, {} good, {} fair, {} miss) score {} best combo {}{}",
        evaluation.accuracy_percentage,
        evaluation.perfect,
        evaluation.good,
        evaluation.fair,
        evaluation.miss,
        evaluation.score,
        evaluation.max_combo,
        if evaluation.passed { "" } else { " - try again" },
    );
}

pub fn print_summary(summary: &SessionSummary) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(summary)?);
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    info!(?cli.command, "starting");
    match cli.command {
        Command::Simulate(args) => simulate::run(args),
        Command::Play(args) => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(interactive::run(args))
        }
    }
}
