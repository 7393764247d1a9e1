//! Board helpers shared by the engine, book and driver.

use shakmaty::fen::Fen;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, EnPassantMode, Move};

use crate::error::WorkerError;

/// Full FEN of a position.
pub fn fen_string(pos: &Chess) -> String {
    Fen::from_position(pos, EnPassantMode::Legal).to_string()
}

/// Strips move counters from FEN, keeping only position + side + castling + ep.
pub fn normalize_fen(fen: &str) -> String {
    fen.split_whitespace().take(4).collect::<Vec<_>>().join(" ")
}

/// Key under which repetitions are counted and book entries stored.
pub fn position_key(pos: &Chess) -> String {
    normalize_fen(&fen_string(pos))
}

pub fn position_from_fen(fen: &str) -> Result<Chess, WorkerError> {
    let parsed: Fen = fen
        .parse()
        .map_err(|e| WorkerError::Config(format!("Invalid FEN '{fen}': {e}")))?;
    parsed
        .into_position(CastlingMode::Standard)
        .map_err(|e| WorkerError::Config(format!("Illegal position '{fen}': {e}")))
}

pub fn uci_string(mv: &Move) -> String {
    mv.to_uci(CastlingMode::Standard).to_string()
}

/// Resolve a UCI move against `pos`.
pub fn parse_uci(pos: &Chess, uci: &str) -> Result<Move, WorkerError> {
    let parsed: UciMove = uci
        .parse()
        .map_err(|e| WorkerError::IllegalMove(format!("unparsable move '{uci}': {e}")))?;
    parsed.to_move(pos).map_err(|e| {
        WorkerError::IllegalMove(format!("'{uci}' in {}: {e}", fen_string(pos)))
    })
}
