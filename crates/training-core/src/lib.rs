//! Core of the self-play training-data pipeline.
//!
//! Pure components only: move selection over ranked engine variations,
//! game outcome labelling, score tapering, and the flat six-line record
//! format. Engine processes and opening books live in `selfplay-worker`.

pub mod error;
pub mod game;
pub mod outcome;
pub mod pgn;
pub mod policy;
pub mod record;
pub mod scaler;
pub mod score;
pub mod stats;

pub use error::CoreError;
pub use game::{GameRecord, GameResult, PlyRecord};
pub use record::{PositionRecord, MAX_EVAL};
pub use score::{AnalysisResult, Score, Variation};
