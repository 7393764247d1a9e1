//! Self-play game generator
//!
//! Plays engine-vs-engine games and appends them to the output file as PGN
//! or plain training records.

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};

use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};

use selfplay_worker::batch::Batch;
use selfplay_worker::book_cache::Book;
use selfplay_worker::config::{SelfplayArgs, SelfplayConfig};
use selfplay_worker::engine::UciEngine;

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C"),
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                }
                return;
            }
            Err(e) => warn!(error = %e, "SIGTERM handler unavailable"),
        }
    }

    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Received Ctrl-C");
    } else {
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Load .env file for local dev
    let _ = dotenvy::dotenv();

    let config = SelfplayConfig::validate(SelfplayArgs::parse())?;

    let book = config.book.as_ref().map(Book::open).transpose()?;

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.output)?;
    let mut out = BufWriter::new(file);

    let mut white = UciEngine::new(&config.white_engine).await?;
    let mut black = match UciEngine::new(&config.black_engine).await {
        Ok(engine) => engine,
        Err(e) => {
            white.quit().await;
            return Err(e.into());
        }
    };
    info!(white = white.name(), black = black.name(), "Engines ready");

    let outcome = Batch::new(&mut white, &mut black, &book, &config)
        .run(&mut out, &mut rng, shutdown_signal())
        .await;

    // Clean up engines
    info!("Shutting down engines");
    white.quit().await;
    black.quit().await;
    out.flush()?;

    let outcome = outcome?;
    info!(
        completed = outcome.completed,
        interrupted = outcome.interrupted,
        tally = %outcome.stats,
        output = %config.output.display(),
        "Batch finished"
    );

    Ok(())
}
