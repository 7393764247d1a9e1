use std::path::PathBuf;

use shakmaty::Chess;
use selfplay_worker::config::{RecordFormat, SelfplayConfig};
use selfplay_worker::driver::DriverSettings;
use selfplay_worker::engine::{Analyzer, SearchLimit};
use selfplay_worker::WorkerError;
use training_core::policy::SelectionMode;
use training_core::{AnalysisResult, Score, Variation};

/// Engine stand-in that replays a fixed list of moves, wrapping around.
pub struct ScriptedEngine {
    replies: Vec<(String, Score)>,
    next: usize,
    pub searched: Vec<String>,
}

impl ScriptedEngine {
    pub fn new(replies: &[(&str, Score)]) -> Self {
        Self {
            replies: replies
                .iter()
                .map(|(mv, score)| (mv.to_string(), *score))
                .collect(),
            next: 0,
            searched: Vec::new(),
        }
    }
}

impl Analyzer for ScriptedEngine {
    async fn analyze(
        &mut self,
        pos: &Chess,
        _limit: SearchLimit,
        _multipv: u32,
        _root_moves: Option<&[String]>,
    ) -> Result<AnalysisResult, WorkerError> {
        self.searched.push(selfplay_worker::board::fen_string(pos));
        if self.replies.is_empty() {
            return Ok(AnalysisResult::default());
        }
        let (mv, score) = self.replies[self.next % self.replies.len()].clone();
        self.next += 1;
        Ok(AnalysisResult::new(vec![Variation {
            moves: vec![mv],
            score,
        }]))
    }
}

/// White half of the fool's mate: 1. f3 2. g4
pub fn fools_mate_white() -> ScriptedEngine {
    ScriptedEngine::new(&[("f2f3", Score::Cp(-20)), ("g2g4", Score::Mate(-1))])
}

/// Black half of the fool's mate: 1... e5 2... Qh4#
pub fn fools_mate_black() -> ScriptedEngine {
    ScriptedEngine::new(&[("e7e5", Score::Cp(60)), ("d8h4", Score::Mate(1))])
}

pub fn driver_settings() -> DriverSettings {
    DriverSettings {
        limit: SearchLimit::Nodes(1),
        multipv: 1,
        mode: SelectionMode::Best,
        move_cutoff: 30,
        book_plies: 0,
        win_threshold: 100,
    }
}

pub fn batch_config(games: u64, format: RecordFormat) -> SelfplayConfig {
    SelfplayConfig {
        white_engine: "white".to_string(),
        black_engine: "black".to_string(),
        games,
        book: None,
        format,
        output: PathBuf::from("unused.pgn"),
        seed: Some(1),
        driver: driver_settings(),
    }
}
