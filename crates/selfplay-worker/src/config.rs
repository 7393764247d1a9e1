//! Self-play configuration: command-line arguments, environment fallbacks
//! and validation.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use training_core::outcome::WIN_THRESHOLD;
use training_core::policy::SelectionMode;
use training_core::scaler::ScorePolicy;

use crate::driver::DriverSettings;
use crate::engine::SearchLimit;
use crate::error::WorkerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// PGN with `[%eval]` comments
    Pgn,
    /// Plain training records
    Plain,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "selfplay", about = "Generate engine self-play games for training data")]
pub struct SelfplayArgs {
    /// Engine binary playing White (and Black unless --engine-black is set)
    #[arg(long, env = "ENGINE_PATH", default_value = "lc0")]
    pub engine: String,

    /// Engine binary playing Black
    #[arg(long)]
    pub engine_black: Option<String>,

    /// Number of games to play
    #[arg(long, default_value_t = 10_000)]
    pub games: u64,

    /// Nodes per search (mutually exclusive with --depth)
    #[arg(long)]
    pub nodes: Option<u64>,

    /// Depth per search (mutually exclusive with --nodes)
    #[arg(long)]
    pub depth: Option<u32>,

    /// Variations requested per search
    #[arg(long, default_value_t = 10)]
    pub multipv: u32,

    /// Move selection among the returned variations. `softmax` keeps only
    /// variations scored within 0.01 cp of zero and fails the game when an
    /// analysis has none.
    #[arg(long, default_value = "best")]
    pub mode: SelectionMode,

    /// Full move after which the best variation is always played
    #[arg(long, default_value_t = 30)]
    pub move_cutoff: u32,

    /// Drop plain records below this ply
    #[arg(long, default_value_t = 0)]
    pub min_ply: u32,

    /// Opening book (bincode)
    #[arg(long)]
    pub book: Option<PathBuf>,

    /// Plies played from the book when it has coverage
    #[arg(long, default_value_t = 16)]
    pub book_plies: u32,

    #[arg(long, value_enum, default_value = "pgn")]
    pub format: OutputFormat,

    /// Score policy for plain records
    #[arg(long)]
    pub score_policy: Option<ScorePolicy>,

    /// Output file, appended to
    #[arg(long, default_value = "main.pgn")]
    pub output: PathBuf,

    /// RNG seed for reproducible batches
    #[arg(long)]
    pub seed: Option<u64>,

    /// Centipawn margin separating a decisive result from a draw
    #[arg(long, default_value_t = WIN_THRESHOLD)]
    pub win_threshold: i32,
}

/// How finished games are written out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
    Pgn,
    Plain { policy: ScorePolicy, min_ply: u32 },
}

/// Validated self-play configuration.
#[derive(Debug, Clone)]
pub struct SelfplayConfig {
    pub white_engine: String,
    pub black_engine: String,
    pub games: u64,
    pub book: Option<PathBuf>,
    pub format: RecordFormat,
    pub output: PathBuf,
    pub seed: Option<u64>,
    pub driver: DriverSettings,
}

impl SelfplayConfig {
    /// Check the arguments before any engine or book is opened.
    pub fn validate(args: SelfplayArgs) -> Result<Self, WorkerError> {
        if args.games == 0 {
            return Err(WorkerError::Config("games must be at least 1".into()));
        }
        if args.multipv == 0 {
            return Err(WorkerError::Config("multipv must be positive".into()));
        }
        if args.move_cutoff == 0 {
            return Err(WorkerError::Config("move cutoff must be positive".into()));
        }
        if args.win_threshold < 0 {
            return Err(WorkerError::Config(format!(
                "win threshold must not be negative, got {}",
                args.win_threshold
            )));
        }

        let limit = SearchLimit::from_options(args.nodes, args.depth)?;

        let format = match args.format {
            OutputFormat::Pgn => RecordFormat::Pgn,
            OutputFormat::Plain => {
                let policy = args.score_policy.ok_or_else(|| {
                    WorkerError::Config("plain output requires --score-policy".into())
                })?;
                RecordFormat::Plain {
                    policy,
                    min_ply: args.min_ply,
                }
            }
        };

        if let Some(book) = &args.book {
            if !book.is_file() {
                return Err(WorkerError::Config(format!(
                    "book file {} does not exist",
                    book.display()
                )));
            }
        }

        let black_engine = args.engine_black.unwrap_or_else(|| args.engine.clone());

        let config = Self {
            white_engine: args.engine,
            black_engine,
            games: args.games,
            book: args.book,
            format,
            output: args.output,
            seed: args.seed,
            driver: DriverSettings {
                limit,
                multipv: args.multipv,
                mode: args.mode,
                move_cutoff: args.move_cutoff,
                book_plies: args.book_plies,
                win_threshold: args.win_threshold,
            },
        };

        if config.driver.mode == SelectionMode::Softmax {
            warn!("Softmax selection fails any position without a variation scored cp 0");
        }
        info!(
            white = %config.white_engine,
            black = %config.black_engine,
            games = config.games,
            limit = %config.driver.limit,
            multipv = config.driver.multipv,
            mode = %config.driver.mode,
            "Self-play config loaded"
        );

        Ok(config)
    }
}
