//! Opening book used to restrict root moves early in a game.
//!
//! Loads the binary book format written by the book builder:
//! normalized FEN -> (SAN -> stats).

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};
use shakmaty::san::San;
use shakmaty::Chess;
use tracing::{info, warn};

use crate::board::{position_key, uci_string};
use crate::error::WorkerError;

/// Stats for a single book move.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookMoveStats {
    pub games: i32,
    pub white_wins: i32,
    pub draws: i32,
    pub black_wins: i32,
}

/// The entire opening book: FEN -> (move_san -> stats)
pub type OpeningBook = HashMap<String, HashMap<String, BookMoveStats>>;

/// A legal book move and its sampling weight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightedMove {
    pub uci: String,
    pub weight: u32,
}

/// Source of opening moves for a position.
pub trait BookLookup {
    /// Legal book moves for `pos`; empty when the book has no coverage.
    fn lookup(&self, pos: &Chess) -> Vec<WeightedMove>;
}

/// No book configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBook;

impl BookLookup for NoBook {
    fn lookup(&self, _pos: &Chess) -> Vec<WeightedMove> {
        Vec::new()
    }
}

impl<B: BookLookup> BookLookup for Option<B> {
    fn lookup(&self, pos: &Chess) -> Vec<WeightedMove> {
        self.as_ref().map(|book| book.lookup(pos)).unwrap_or_default()
    }
}

/// Load the book from a binary file.
pub fn load_book<P: AsRef<Path>>(path: P) -> Result<OpeningBook, WorkerError> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| WorkerError::Book(format!("Failed to open {}: {e}", path.display())))?;
    let reader = BufReader::new(file);
    bincode::deserialize_from(reader)
        .map_err(|e| WorkerError::Book(format!("Failed to decode {}: {e}", path.display())))
}

/// In-memory opening book.
#[derive(Debug, Clone, Default)]
pub struct Book {
    entries: OpeningBook,
}

impl Book {
    pub fn new(entries: OpeningBook) -> Self {
        Self { entries }
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, WorkerError> {
        let entries = load_book(path)?;
        let total_moves: usize = entries.values().map(|m| m.len()).sum();
        info!(
            positions = entries.len(),
            moves = total_moves,
            "Loaded opening book"
        );
        Ok(Self::new(entries))
    }

    pub fn positions(&self) -> usize {
        self.entries.len()
    }
}

impl BookLookup for Book {
    fn lookup(&self, pos: &Chess) -> Vec<WeightedMove> {
        let Some(moves) = self.entries.get(&position_key(pos)) else {
            return Vec::new();
        };

        let mut found: Vec<WeightedMove> = moves
            .iter()
            .filter(|(_, stats)| stats.games > 0)
            .filter_map(|(san, stats)| {
                let parsed: San = match san.parse() {
                    Ok(parsed) => parsed,
                    Err(_) => {
                        warn!(san = %san, "Unparsable book move, skipping");
                        return None;
                    }
                };
                let mv = parsed.to_move(pos).ok()?;
                Some(WeightedMove {
                    uci: uci_string(&mv),
                    weight: stats.games as u32,
                })
            })
            .collect();

        // HashMap order is unstable; keep sampling reproducible under a seed
        found.sort_by(|a, b| a.uci.cmp(&b.uci));
        found
    }
}
