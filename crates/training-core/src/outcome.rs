//! Game outcome labelling and batch result tallies.

use std::fmt;

use shakmaty::Color;

use crate::error::CoreError;
use crate::game::GameResult;
use crate::score::{Score, MATE_SCORE};

/// Default margin (centipawns) below which a final evaluation counts as a draw.
pub const WIN_THRESHOLD: i32 = 100;

/// Terminal predicates of a finished position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TerminalState {
    pub checkmate: bool,
    pub stalemate: bool,
    pub insufficient_material: bool,
    pub seventy_five_moves: bool,
    pub fivefold_repetition: bool,
}

impl TerminalState {
    pub fn is_terminal(&self) -> bool {
        self.checkmate || self.is_drawn()
    }

    /// True when one of the rule-based draw predicates holds.
    pub fn is_drawn(&self) -> bool {
        self.stalemate
            || self.insufficient_material
            || self.seventy_five_moves
            || self.fivefold_repetition
    }

    pub fn reason(&self) -> Option<&'static str> {
        if self.checkmate {
            Some("checkmate")
        } else if self.stalemate {
            Some("stalemate")
        } else if self.insufficient_material {
            Some("insufficient material")
        } else if self.seventy_five_moves {
            Some("seventy-five-move rule")
        } else if self.fivefold_repetition {
            Some("fivefold repetition")
        } else {
            None
        }
    }
}

/// Label a finished game.
///
/// `mover` is the side that played the last move and `last_score` the score
/// of that move relative to `mover`. Mates count as `MATE_SCORE`.
pub fn classify(
    state: &TerminalState,
    mover: Color,
    last_score: Score,
    win_threshold: i32,
) -> GameResult {
    if state.checkmate {
        return match mover {
            Color::White => GameResult::WhiteWins,
            Color::Black => GameResult::BlackWins,
        };
    }

    let white_cp = last_score.white_pov(mover).to_cp(MATE_SCORE);

    if state.is_drawn() || white_cp.abs() <= win_threshold {
        GameResult::Draw
    } else if white_cp < -win_threshold {
        GameResult::BlackWins
    } else {
        GameResult::WhiteWins
    }
}

/// Running win/draw/loss tallies over a batch of games.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub white_wins: u64,
    pub draws: u64,
    pub black_wins: u64,
}

impl BatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, result: GameResult) {
        match result {
            GameResult::WhiteWins => self.white_wins += 1,
            GameResult::BlackWins => self.black_wins += 1,
            GameResult::Draw => self.draws += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.white_wins + self.draws + self.black_wins
    }

    /// Check that every completed game has been tallied exactly once.
    pub fn verify(&self, completed: u64) -> Result<(), CoreError> {
        let tallied = self.total();
        if tallied != completed {
            return Err(CoreError::ResultMismatch { tallied, completed });
        }
        Ok(())
    }
}

impl fmt::Display for BatchStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "+{} ={} -{} (white/draw/black)",
            self.white_wins, self.draws, self.black_wins
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mate() -> TerminalState {
        TerminalState {
            checkmate: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_checkmate_credits_mover() {
        assert_eq!(
            classify(&mate(), Color::White, Score::Mate(1), WIN_THRESHOLD),
            GameResult::WhiteWins
        );
        assert_eq!(
            classify(&mate(), Color::Black, Score::Cp(-5000), WIN_THRESHOLD),
            GameResult::BlackWins
        );
    }

    #[test]
    fn test_rule_draws_ignore_score() {
        let draws = [
            TerminalState { stalemate: true, ..Default::default() },
            TerminalState { insufficient_material: true, ..Default::default() },
            TerminalState { seventy_five_moves: true, ..Default::default() },
            TerminalState { fivefold_repetition: true, ..Default::default() },
        ];
        for state in &draws {
            for score in [Score::Cp(900), Score::Cp(-900), Score::Mate(3), Score::Mate(-3)] {
                assert_eq!(
                    classify(state, Color::White, score, WIN_THRESHOLD),
                    GameResult::Draw,
                    "{:?} with {score}",
                    state.reason()
                );
            }
        }
    }

    #[test]
    fn test_score_threshold() {
        let state = TerminalState::default();
        assert_eq!(classify(&state, Color::White, Score::Cp(100), 100), GameResult::Draw);
        assert_eq!(classify(&state, Color::White, Score::Cp(-100), 100), GameResult::Draw);
        assert_eq!(classify(&state, Color::White, Score::Cp(101), 100), GameResult::WhiteWins);
        assert_eq!(classify(&state, Color::White, Score::Cp(-101), 100), GameResult::BlackWins);
        // Black moved last and is ahead
        assert_eq!(classify(&state, Color::Black, Score::Cp(250), 100), GameResult::BlackWins);
        assert_eq!(classify(&state, Color::Black, Score::Mate(-2), 100), GameResult::WhiteWins);
    }

    #[test]
    fn test_batch_stats_verify() {
        let mut stats = BatchStats::new();
        stats.record(GameResult::WhiteWins);
        stats.record(GameResult::Draw);
        stats.record(GameResult::Draw);
        assert_eq!(stats.total(), 3);
        assert!(stats.verify(3).is_ok());
        assert!(matches!(
            stats.verify(4),
            Err(CoreError::ResultMismatch { tallied: 3, completed: 4 })
        ));
        assert_eq!(stats.to_string(), "+1 =2 -0 (white/draw/black)");
    }
}
