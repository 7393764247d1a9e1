use shakmaty::Color;

use crate::error::CoreError;
use crate::score::Score;

/// Final result of a game, in the fixed colour frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameResult {
    /// First player (White) wins
    WhiteWins,
    /// Second player (Black) wins
    BlackWins,
    Draw,
}

impl GameResult {
    pub fn pgn_token(self) -> &'static str {
        match self {
            GameResult::WhiteWins => "1-0",
            GameResult::BlackWins => "0-1",
            GameResult::Draw => "1/2-1/2",
        }
    }

    pub fn from_pgn_token(token: &str) -> Option<Self> {
        match token {
            "1-0" => Some(GameResult::WhiteWins),
            "0-1" => Some(GameResult::BlackWins),
            "1/2-1/2" => Some(GameResult::Draw),
            _ => None,
        }
    }

    /// Result as -1/0/1 from the point of view of the side to move.
    pub fn for_mover(self, mover: Color) -> i8 {
        match (self, mover) {
            (GameResult::Draw, _) => 0,
            (GameResult::WhiteWins, Color::White) | (GameResult::BlackWins, Color::Black) => 1,
            _ => -1,
        }
    }

    pub fn winner(self) -> Option<Color> {
        match self {
            GameResult::WhiteWins => Some(Color::White),
            GameResult::BlackWins => Some(Color::Black),
            GameResult::Draw => None,
        }
    }
}

/// A single half-move of a played game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlyRecord {
    /// FEN of the position before the move
    pub fen: String,
    /// Side that played the move
    pub mover: Color,
    /// Move in UCI notation
    pub mv: String,
    /// Score reported for the chosen move, relative to `mover`
    pub score: Score,
    /// 1-based ply index
    pub ply: u32,
}

/// A game built ply by ply; read-only once finished.
#[derive(Debug, Clone, Default)]
pub struct GameRecord {
    plies: Vec<PlyRecord>,
    result: Option<GameResult>,
}

impl GameRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the next move. Ply numbering is assigned here.
    pub fn push_ply(
        &mut self,
        fen: String,
        mover: Color,
        mv: String,
        score: Score,
    ) -> Result<u32, CoreError> {
        if self.result.is_some() {
            return Err(CoreError::InvalidRecord(
                "cannot append a move to a finished game".into(),
            ));
        }
        let ply = self.plies.len() as u32 + 1;
        self.plies.push(PlyRecord {
            fen,
            mover,
            mv,
            score,
            ply,
        });
        Ok(ply)
    }

    /// Set the result. May only happen once.
    pub fn finish(&mut self, result: GameResult) -> Result<(), CoreError> {
        if let Some(existing) = self.result {
            return Err(CoreError::InvalidRecord(format!(
                "result already set to {}",
                existing.pgn_token()
            )));
        }
        self.result = Some(result);
        Ok(())
    }

    pub fn plies(&self) -> &[PlyRecord] {
        &self.plies
    }

    pub fn len(&self) -> usize {
        self.plies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plies.is_empty()
    }

    pub fn result(&self) -> Option<GameResult> {
        self.result
    }

    pub fn is_finished(&self) -> bool {
        self.result.is_some()
    }

    pub fn last(&self) -> Option<&PlyRecord> {
        self.plies.last()
    }
}
