//! Convert annotated PGN into plain training records.
//!
//! Usage: pgn-to-plain --pgn 'games/main-*.pgn' [--score-policy tapered] [--output plain.txt]
//!
//! Without a score policy the records keep raw engine-unit scores, ready
//! for `rescale`.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;

use anyhow::bail;
use clap::Parser;
use tracing::info;

use selfplay_worker::pgn_import::{expand_pgn_pattern, import_games};
use training_core::record::write_records;
use training_core::scaler::{game_to_raw_records, game_to_records, ScorePolicy};

#[derive(Parser, Debug)]
#[command(name = "pgn-to-plain", about = "Convert PGN with [%eval] comments into plain records")]
struct Args {
    /// PGN file or glob pattern
    #[arg(long)]
    pgn: String,

    #[arg(long, default_value = "plain.txt")]
    output: PathBuf,

    /// Label records with this policy instead of raw engine scores
    #[arg(long)]
    score_policy: Option<ScorePolicy>,

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

    let pgn_files = expand_pgn_pattern(&args.pgn)?;
    if pgn_files.is_empty() {
        bail!("No PGN files match {}", args.pgn);
    }

    let mut out = BufWriter::new(File::create(&args.output)?);
    let mut records_written = 0u64;

    for pgn_path in &pgn_files {
        info!(file = %pgn_path.display(), "Parsing");
        let reader = BufReader::new(File::open(pgn_path)?);

        let summary = import_games(reader, |game| {
            let records = match args.score_policy {
                Some(policy) => game_to_records(&game, policy)?,
                None => game_to_raw_records(&game)?,
            };
            let kept: Vec<_> = records.iter().filter(|r| r.ply >= args.min_ply).collect();
            write_records(&mut out, kept.iter().copied())?;
            records_written += kept.len() as u64;
            Ok(())
        })?;

        info!(
            file = %pgn_path.display(),
            games = summary.games,
            skipped = summary.skipped,
            "Parsed"
        );
    }

    out.flush()?;
    let labels = args
        .score_policy
        .map_or_else(|| "raw".to_string(), |policy| policy.to_string());
    info!(records = records_written, %labels, output = %args.output.display(), "Done");
    Ok(())
}
