//! Re-label the scores of a raw plain record file.
//!
//! Usage: rescale --file data.plain --policy tapered [--output fixed.plain] [--strict]
//!
//! Input scores are raw engine units as written by `pgn-to-plain` without
//! a score policy. Pass `--scaled-input` to re-label a file that already
//! holds training scores; only `outcome-linear` applies there.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;

use clap::Parser;
use tracing::{info, warn};

use training_core::record::{ParseMode, RecordReader};
use training_core::scaler::{InputScores, Rescaler, ScorePolicy};

#[derive(Parser, Debug)]
#[command(name = "rescale", about = "Rewrite plain record scores with a score policy")]
struct Args {
    #[arg(long)]
    file: PathBuf,

    #[arg(long)]
    policy: ScorePolicy,

    /// Output file, appended to (default: fix-<timestamp>.plain)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Stop at the first malformed record instead of skipping it
    #[arg(long)]
    strict: bool,

    /// Input scores are already scaled to MAX_EVAL
    #[arg(long)]
    scaled_input: bool,

    /// Drop records below this ply
    #[arg(long, default_value_t = 0)]
    min_ply: u32,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    let input = if args.scaled_input {
        InputScores::Scaled
    } else {
        InputScores::Raw
    };
    let mut rescaler = Rescaler::for_input(args.policy, input)?;

    let output = args.output.clone().unwrap_or_else(|| {
        PathBuf::from(format!(
            "fix-{}.plain",
            chrono::Local::now().format("%Y%m%d-%H%M%S")
        ))
    });

    let mode = if args.strict {
        ParseMode::Strict
    } else {
        ParseMode::Lenient
    };
    let mut records = RecordReader::new(BufReader::new(File::open(&args.file)?), mode)
        .with_min_ply(args.min_ply);
    if input == InputScores::Raw {
        records = records.with_raw_scores();
    }
    let mut out = BufWriter::new(OpenOptions::new().create(true).append(true).open(&output)?);
    let mut positions = 0u64;

    for record in &mut records {
        let rescaled = rescaler.rescale(&record?)?;
        rescaled.write_to(&mut out)?;
        positions += 1;
        if positions % 100_000 == 0 {
            info!(positions, games = rescaler.games(), "Rescale progress");
        }
    }
    out.flush()?;

    if records.malformed() > 0 {
        warn!(malformed = records.malformed(), "Skipped malformed records");
    }
    info!(
        positions,
        games = rescaler.games(),
        policy = %args.policy,
        output = %output.display(),
        "Done"
    );
    Ok(())
}
