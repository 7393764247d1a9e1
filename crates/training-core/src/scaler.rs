//! Score tapering: raw evaluations to bounded, phase-normalized targets.
//!
//! Two labelling policies coexist and are picked by the caller:
//! [`tapered_eval`] rescales each move's own score by game phase, while
//! [`outcome_linear_eval`] ignores per-move scores and ramps the final
//! result linearly over the game.
//!
//! Raw plain files keep the engine's own units instead: centipawns times
//! [`RAW_SCORE_FACTOR`], mates as [`RAW_MATE_SCORE`]. [`Rescaler`] turns
//! those into bounded training scores.

use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;
use crate::game::{GameRecord, PlyRecord};
use crate::record::{PositionRecord, MAX_EVAL};
use crate::score::{Score, MATE_SCORE};

/// Engine units per centipawn in raw plain files.
pub const RAW_SCORE_FACTOR: f64 = 2.08;
/// Centipawn value of a forced mate before the raw factor is applied.
pub const RAW_MATE_SCORE: i32 = 15000;

/// Middlegame "known win" reference: 1034.96·e^(−1.43687·p)
const MG_REF_SCALE: f64 = 1034.96;
const MG_REF_DECAY: f64 = 1.43687;
const MG_REF_MIN: f64 = 245.0;
const MG_REF_MAX: f64 = 1035.0;

/// Endgame "known win" reference: 300·e^(−1.09861·p)
const EG_REF_SCALE: f64 = 300.0;
const EG_REF_DECAY: f64 = 1.09861;
const EG_REF_MIN: f64 = 85.0;
const EG_REF_MAX: f64 = 350.0;

fn clamp_eval(x: f64) -> f64 {
    let max = f64::from(MAX_EVAL);
    x.clamp(-max, max)
}

/// Per-move tapered score.
///
/// `score` is the raw mover-relative evaluation, `progress` is
/// `ply / total_plies` and is clamped to `[0, 1]`.
pub fn tapered_eval(score: i32, progress: f64) -> i32 {
    let p = if progress.is_nan() { 0.0 } else { progress.clamp(0.0, 1.0) };
    let score = f64::from(score);
    let max = f64::from(MAX_EVAL);

    let mg_ref = (MG_REF_SCALE * (-MG_REF_DECAY * p).exp()).clamp(MG_REF_MIN, MG_REF_MAX);
    let eg_ref = (EG_REF_SCALE * (-EG_REF_DECAY * p).exp()).clamp(EG_REF_MIN, EG_REF_MAX);

    let mg_scaled = clamp_eval(score / mg_ref * max);
    let eg_scaled = clamp_eval(score / eg_ref * max);

    ((1.0 - p) * mg_scaled + p * eg_scaled).round() as i32
}

/// Raw engine-unit score, truncated toward zero.
pub fn raw_eval(score: Score) -> i32 {
    (f64::from(score.to_cp(RAW_MATE_SCORE)) * RAW_SCORE_FACTOR) as i32
}

/// Centipawns back from a raw engine-unit score.
pub fn raw_to_cp(raw: i32) -> i32 {
    (f64::from(raw) / RAW_SCORE_FACTOR).round() as i32
}

/// Outcome-linear score: `sign(result) · (ply / total_plies) · MAX_EVAL`.
pub fn outcome_linear_eval(result: i8, ply: u32, total_plies: u32) -> i32 {
    if total_plies == 0 {
        return 0;
    }
    let progress = (f64::from(ply) / f64::from(total_plies)).min(1.0);
    (f64::from(result.signum()) * progress * f64::from(MAX_EVAL)) as i32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScorePolicy {
    /// Phase-tapered per-move score
    Tapered,
    /// Final result ramped over the game
    OutcomeLinear,
}

impl ScorePolicy {
    /// Training score for one position.
    pub fn scale(self, raw_score: i32, result: i8, ply: u32, total_plies: u32) -> i32 {
        match self {
            ScorePolicy::Tapered => {
                let progress = if total_plies == 0 {
                    0.0
                } else {
                    f64::from(ply) / f64::from(total_plies)
                };
                tapered_eval(raw_score, progress)
            }
            ScorePolicy::OutcomeLinear => outcome_linear_eval(result, ply, total_plies),
        }
    }
}

impl FromStr for ScorePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tapered" | "gensfen_eval" => Ok(ScorePolicy::Tapered),
            "outcome-linear" | "outcome_linear" | "linear" => Ok(ScorePolicy::OutcomeLinear),
            other => Err(format!(
                "invalid score policy '{other}', expected tapered or outcome-linear"
            )),
        }
    }
}

impl fmt::Display for ScorePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScorePolicy::Tapered => "tapered",
            ScorePolicy::OutcomeLinear => "outcome-linear",
        })
    }
}

/// Convert a finished game into training records.
///
/// Records come out last ply first, the order the plain files have always
/// used; [`Rescaler`] relies on it to find game boundaries.
pub fn game_to_records(
    game: &GameRecord,
    policy: ScorePolicy,
) -> Result<Vec<PositionRecord>, CoreError> {
    let total = game.len() as u32;
    label_plies(game, |ply, result| {
        let score = policy.scale(ply.score.to_cp(MATE_SCORE), result, ply.ply, total);
        PositionRecord::new(ply.fen.clone(), ply.mv.clone(), score, ply.ply, result)
    })
}

/// Convert a finished game into records holding [`raw_eval`] scores.
pub fn game_to_raw_records(game: &GameRecord) -> Result<Vec<PositionRecord>, CoreError> {
    label_plies(game, |ply, result| {
        PositionRecord::raw(ply.fen.clone(), ply.mv.clone(), raw_eval(ply.score), ply.ply, result)
    })
}

fn label_plies<F>(game: &GameRecord, mut label: F) -> Result<Vec<PositionRecord>, CoreError>
where
    F: FnMut(&PlyRecord, i8) -> Result<PositionRecord, CoreError>,
{
    let result = game
        .result()
        .ok_or_else(|| CoreError::InvalidRecord("game has no result".into()))?;

    game.plies()
        .iter()
        .rev()
        .map(|ply| label(ply, result.for_mover(ply.mover)))
        .collect()
}

/// Scale of the scores a [`Rescaler`] reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputScores {
    /// Engine units, see [`raw_eval`]
    Raw,
    /// Already bounded training scores
    Scaled,
}

/// Re-labels a stream of existing records with another policy.
///
/// Total plies of each game are inferred from the stream: within a game
/// plies descend, so a ply larger than its predecessor opens a new game
/// whose length is that ply. Input scores may be unbounded; only the
/// output is held to [`MAX_EVAL`].
#[derive(Debug)]
pub struct Rescaler {
    policy: ScorePolicy,
    input: InputScores,
    past_ply: u32,
    game_plies: u32,
    games: u64,
}

impl Rescaler {
    /// Rescaler over raw engine-unit records.
    pub fn new(policy: ScorePolicy) -> Self {
        Self {
            policy,
            input: InputScores::Raw,
            past_ply: 0,
            game_plies: 0,
            games: 0,
        }
    }

    /// Rescaler over records whose scores were already scaled.
    ///
    /// Tapering needs the engine's own score, so only policies that ignore
    /// the stored score are allowed here.
    pub fn for_input(policy: ScorePolicy, input: InputScores) -> Result<Self, CoreError> {
        if input == InputScores::Scaled && policy == ScorePolicy::Tapered {
            return Err(CoreError::InvalidRecord(
                "tapered rescaling needs raw engine scores, not scaled ones".into(),
            ));
        }
        Ok(Self {
            input,
            ..Self::new(policy)
        })
    }

    pub fn rescale(&mut self, record: &PositionRecord) -> Result<PositionRecord, CoreError> {
        if record.ply > self.past_ply {
            self.game_plies = record.ply;
            self.games += 1;
        }
        self.past_ply = record.ply;

        let cp = match self.input {
            InputScores::Raw => raw_to_cp(record.score),
            InputScores::Scaled => record.score,
        };
        let score = self
            .policy
            .scale(cp, record.result, record.ply, self.game_plies);
        PositionRecord::new(
            record.fen.clone(),
            record.mv.clone(),
            score,
            record.ply,
            record.result,
        )
    }

    /// Games seen so far.
    pub fn games(&self) -> u64 {
        self.games
    }
}
