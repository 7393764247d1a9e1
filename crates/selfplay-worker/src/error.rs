//! Worker error types

use thiserror::Error;
use training_core::CoreError;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Engine protocol error: {0}")]
    EngineProtocol(String),

    #[error("Book error: {0}")]
    Book(String),

    #[error("Illegal move: {0}")]
    IllegalMove(String),

    #[error("Game {game} failed: {source}")]
    Game {
        game: u64,
        source: Box<WorkerError>,
    },

    #[error("ply {ply} at {fen}: {source}")]
    Ply {
        ply: u32,
        fen: String,
        source: Box<WorkerError>,
    },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    /// Attach the game index to an error raised while playing it.
    pub fn in_game(self, game: u64) -> Self {
        WorkerError::Game {
            game,
            source: Box::new(self),
        }
    }

    /// Attach the ply number and position to an error raised while choosing a move.
    pub fn in_ply(self, ply: u32, fen: impl Into<String>) -> Self {
        WorkerError::Ply {
            ply,
            fen: fen.into(),
            source: Box::new(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_chain_in_message() {
        let err = WorkerError::IllegalMove("e2e5".into())
            .in_ply(3, "8/8/8/8/8/8/8/K6k w - - 0 1")
            .in_game(7);
        assert_eq!(
            err.to_string(),
            "Game 7 failed: ply 3 at 8/8/8/8/8/8/8/K6k w - - 0 1: Illegal move: e2e5"
        );
    }
}
