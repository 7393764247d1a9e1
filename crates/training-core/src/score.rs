//! Engine scores and ranked variations.

use std::fmt;

use shakmaty::Color;

/// Mate magnitude used when a forced mate must be compared against
/// centipawn thresholds.
pub const MATE_SCORE: i32 = 32000;

/// Evaluation relative to the side to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Score {
    /// Centipawns
    Cp(i32),
    /// Mate in N moves (positive = side to move mates, zero or negative = gets mated)
    Mate(i32),
}

impl Score {
    /// Centipawn value, with `±mate_value` substituted for a mate.
    pub fn to_cp(self, mate_value: i32) -> i32 {
        match self {
            Score::Cp(cp) => cp,
            Score::Mate(n) if n > 0 => mate_value,
            Score::Mate(_) => -mate_value,
        }
    }

    pub fn is_mate(self) -> bool {
        matches!(self, Score::Mate(_))
    }

    /// The same evaluation seen from the other side.
    pub fn flip(self) -> Score {
        match self {
            Score::Cp(cp) => Score::Cp(-cp),
            Score::Mate(n) => Score::Mate(-n),
        }
    }

    /// Re-express a score given relative to `mover` from White's point of view.
    pub fn white_pov(self, mover: Color) -> Score {
        match mover {
            Color::White => self,
            Color::Black => self.flip(),
        }
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Score::Cp(cp) => write!(f, "cp {cp}"),
            Score::Mate(n) => write!(f, "mate {n}"),
        }
    }
}

/// One ranked candidate line from engine analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variation {
    /// Principal variation in UCI notation, never empty
    pub moves: Vec<String>,
    pub score: Score,
}

impl Variation {
    pub fn first_move(&self) -> &str {
        self.moves.first().map(String::as_str).unwrap_or_default()
    }
}

/// Variations ordered best-first (MultiPV order).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisResult {
    pub variations: Vec<Variation>,
}

impl AnalysisResult {
    pub fn new(variations: Vec<Variation>) -> Self {
        Self { variations }
    }

    pub fn best(&self) -> Option<&Variation> {
        self.variations.first()
    }

    pub fn len(&self) -> usize {
        self.variations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variations.is_empty()
    }
}
