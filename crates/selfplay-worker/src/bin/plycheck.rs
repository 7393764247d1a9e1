//! Per-ply average evaluation of a plain record file.
//!
//! Usage: plycheck --file data.plain [--ply 20]

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use training_core::stats::PlyStats;

#[derive(Parser, Debug)]
#[command(name = "plycheck", about = "Average absolute evaluation per ply")]
struct Args {
    #[arg(long)]
    file: PathBuf,

    /// Report the average over plies after this one
    #[arg(long, default_value_t = 0)]
    ply: u32,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    let file = File::open(&args.file)
        .with_context(|| format!("Failed to open {}", args.file.display()))?;
    let stats = PlyStats::from_reader(BufReader::new(file))?;

    for (ply, mean) in stats.per_ply_means() {
        println!("ply: {ply}, avg_eval: {mean}");
    }

    println!("file_name: {}", args.file.display());
    match stats.mean_after(args.ply) {
        Some(mean) => println!("average eval after ply {}: {mean}", args.ply),
        None => println!("average eval after ply {}: no positions", args.ply),
    }
    match stats.max_score() {
        Some(max) => println!("max eval after ply {}: {max}", args.ply),
        None => println!("max eval after ply {}: no scores", args.ply),
    }
    Ok(())
}
