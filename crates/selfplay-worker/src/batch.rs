//! Runs a batch of games and appends each finished game to the output.

use std::future::Future;
use std::io::Write;

use rand::Rng;
use tracing::{info, warn};
use training_core::outcome::BatchStats;
use training_core::pgn::{render_pgn, PgnHeaders};
use training_core::record::render_records;
use training_core::scaler::game_to_records;
use training_core::{CoreError, GameRecord};

use crate::book_cache::BookLookup;
use crate::config::{RecordFormat, SelfplayConfig};
use crate::driver::GameDriver;
use crate::engine::Analyzer;
use crate::error::WorkerError;

/// What a batch produced before it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOutcome {
    pub completed: u64,
    pub stats: BatchStats,
    /// Stopped by the shutdown signal rather than by reaching the game count
    pub interrupted: bool,
}

/// Host name for the PGN Site tag.
pub fn default_site() -> String {
    let name = gethostname::gethostname().to_string_lossy().trim().to_string();
    if name.is_empty() {
        "localhost".to_string()
    } else {
        name
    }
}

pub struct Batch<'a, E, B> {
    white: &'a mut E,
    black: &'a mut E,
    book: &'a B,
    config: &'a SelfplayConfig,
    site: String,
}

impl<'a, E: Analyzer, B: BookLookup> Batch<'a, E, B> {
    pub fn new(white: &'a mut E, black: &'a mut E, book: &'a B, config: &'a SelfplayConfig) -> Self {
        Self {
            white,
            black,
            book,
            config,
            site: default_site(),
        }
    }

    pub fn with_site(mut self, site: impl Into<String>) -> Self {
        self.site = site.into();
        self
    }

    /// Play `config.games` games, or fewer if `shutdown` resolves first.
    ///
    /// A game interrupted by `shutdown` is dropped; everything written before
    /// it is complete.
    pub async fn run<W, R, S>(
        &mut self,
        out: &mut W,
        rng: &mut R,
        shutdown: S,
    ) -> Result<BatchOutcome, WorkerError>
    where
        W: Write,
        R: Rng + ?Sized,
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut stats = BatchStats::new();
        let mut completed = 0u64;

        for round in 1..=self.config.games {
            let game = {
                let mut driver =
                    GameDriver::new(&mut *self.white, &mut *self.black, self.book, &self.config.driver);
                tokio::select! {
                    biased;
                    _ = &mut shutdown => {
                        warn!(game = round, completed, "Shutdown requested, dropping game in progress");
                        return Ok(BatchOutcome {
                            completed,
                            stats,
                            interrupted: true,
                        });
                    }
                    played = driver.play(&mut *rng) => played.map_err(|e| e.in_game(round))?,
                }
            };

            let result = game
                .result()
                .ok_or_else(|| WorkerError::from(CoreError::InvalidRecord("unfinished game".into())))
                .map_err(|e| e.in_game(round))?;
            stats.record(result);
            completed += 1;
            stats.verify(completed)?;

            let text = self.render(&game, round).map_err(|e| e.in_game(round))?;
            out.write_all(text.as_bytes())?;
            out.flush()?;

            info!(
                game = round,
                plies = game.len(),
                result = result.pgn_token(),
                tally = %stats,
                "Game finished"
            );
        }

        Ok(BatchOutcome {
            completed,
            stats,
            interrupted: false,
        })
    }

    fn render(&self, game: &GameRecord, round: u64) -> Result<String, WorkerError> {
        match self.config.format {
            RecordFormat::Pgn => {
                let headers = PgnHeaders::generated(
                    round,
                    &self.site,
                    &self.config.white_engine,
                    &self.config.black_engine,
                );
                Ok(render_pgn(game, &headers)?)
            }
            RecordFormat::Plain { policy, min_ply } => {
                let records = game_to_records(game, policy)?;
                Ok(render_records(records.iter().filter(|r| r.ply >= min_ply)))
            }
        }
    }
}
