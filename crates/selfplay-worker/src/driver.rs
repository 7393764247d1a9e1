//! Plays one game between two engines and records it.

use std::collections::HashMap;

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use shakmaty::{Chess, Color, Move, Position};
use tracing::debug;
use training_core::outcome::{classify, TerminalState};
use training_core::policy::{select, SelectionMode};
use training_core::{GameRecord, Score};

use crate::board::{fen_string, parse_uci, position_key, uci_string};
use crate::book_cache::BookLookup;
use crate::engine::{Analyzer, SearchLimit};
use crate::error::WorkerError;

/// Halfmove clock value at which the seventy-five-move rule ends the game.
pub const SEVENTY_FIVE_MOVE_PLIES: u32 = 150;

/// Occurrences of one position that end the game.
pub const FIVEFOLD: u32 = 5;

/// Per-game search and selection parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverSettings {
    pub limit: SearchLimit,
    pub multipv: u32,
    pub mode: SelectionMode,
    /// Full move after which selection is forced to the best variation
    pub move_cutoff: u32,
    /// Plies taken from the book while it has coverage
    pub book_plies: u32,
    pub win_threshold: i32,
}

impl DriverSettings {
    /// Selection mode in effect at the given full move.
    pub fn mode_at(&self, fullmove: u32) -> SelectionMode {
        if fullmove > self.move_cutoff {
            SelectionMode::Best
        } else {
            self.mode
        }
    }
}

/// Terminal predicates for `pos`, seen `repetitions` times so far.
pub fn terminal_state(pos: &Chess, repetitions: u32) -> TerminalState {
    TerminalState {
        checkmate: pos.is_checkmate(),
        stalemate: pos.is_stalemate(),
        insufficient_material: pos.is_insufficient_material(),
        seventy_five_moves: pos.halfmoves() >= SEVENTY_FIVE_MOVE_PLIES,
        fivefold_repetition: repetitions >= FIVEFOLD,
    }
}

pub struct GameDriver<'a, E, B> {
    white: &'a mut E,
    black: &'a mut E,
    book: &'a B,
    settings: &'a DriverSettings,
}

impl<'a, E: Analyzer, B: BookLookup> GameDriver<'a, E, B> {
    pub fn new(white: &'a mut E, black: &'a mut E, book: &'a B, settings: &'a DriverSettings) -> Self {
        Self {
            white,
            black,
            book,
            settings,
        }
    }

    /// Play a game from the standard starting position.
    pub async fn play<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<GameRecord, WorkerError> {
        self.play_from(Chess::default(), rng).await
    }

    /// Play until a terminal position; the returned record is finished.
    pub async fn play_from<R: Rng + ?Sized>(
        &mut self,
        start: Chess,
        rng: &mut R,
    ) -> Result<GameRecord, WorkerError> {
        let mut pos = start;
        if terminal_state(&pos, 1).is_terminal() {
            return Err(WorkerError::Config(format!(
                "start position {} is already terminal",
                fen_string(&pos)
            )));
        }

        let mut seen: HashMap<String, u32> = HashMap::new();
        seen.insert(position_key(&pos), 1);
        let mut game = GameRecord::new();

        loop {
            let turn = pos.turn();
            let ply = game.len() as u32 + 1;
            let fen = fen_string(&pos);
            let (uci, mv, score) = self
                .choose_move(&pos, game.len() as u32, rng)
                .await
                .map_err(|e| e.in_ply(ply, fen.as_str()))?;
            debug!(ply, mv = %uci, score = %score, "Move selected");

            game.push_ply(fen.clone(), turn, uci, score)
                .map_err(|e| WorkerError::from(e).in_ply(ply, fen))?;
            pos.play_unchecked(mv);

            let repetitions = seen.entry(position_key(&pos)).or_insert(0);
            *repetitions += 1;

            let state = terminal_state(&pos, *repetitions);
            if state.is_terminal() {
                let result = classify(&state, turn, score, self.settings.win_threshold);
                debug!(
                    plies = game.len(),
                    reason = state.reason().unwrap_or("terminal"),
                    result = result.pgn_token(),
                    "Game over"
                );
                game.finish(result)?;
                return Ok(game);
            }
        }
    }

    /// Ask the side to move's engine for a move and pick one of its lines.
    async fn choose_move<R: Rng + ?Sized>(
        &mut self,
        pos: &Chess,
        played: u32,
        rng: &mut R,
    ) -> Result<(String, Move, Score), WorkerError> {
        let turn = pos.turn();
        let fullmove = pos.fullmoves().get();
        let root_moves = self.root_moves(pos, played, fullmove, rng)?;

        let engine = match turn {
            Color::White => &mut *self.white,
            Color::Black => &mut *self.black,
        };
        let analysis = engine
            .analyze(
                pos,
                self.settings.limit,
                self.settings.multipv,
                root_moves.as_deref(),
            )
            .await?;
        if analysis.is_empty() {
            return Err(WorkerError::EngineProtocol(format!(
                "no variations returned for {}",
                fen_string(pos)
            )));
        }

        let (uci, score) = select(&analysis, turn, self.settings.mode_at(fullmove), rng)?;
        let mv = parse_uci(pos, &uci)?;
        Ok((uci, mv, score))
    }

    /// Moves the engine is restricted to at the root, if any.
    fn root_moves<R: Rng + ?Sized>(
        &self,
        pos: &Chess,
        played: u32,
        fullmove: u32,
        rng: &mut R,
    ) -> Result<Option<Vec<String>>, WorkerError> {
        if played < self.settings.book_plies {
            let book_moves = self.book.lookup(pos);
            if !book_moves.is_empty() {
                let dist = WeightedIndex::new(book_moves.iter().map(|m| m.weight))
                    .map_err(|e| WorkerError::Book(format!("bad book weights: {e}")))?;
                let chosen = &book_moves[dist.sample(rng)];
                debug!(mv = %chosen.uci, weight = chosen.weight, "Book move");
                return Ok(Some(vec![chosen.uci.clone()]));
            }
        }

        if self.settings.mode == SelectionMode::Random && fullmove < self.settings.move_cutoff {
            let legal = pos.legal_moves();
            if !legal.is_empty() {
                let mv = &legal[rng.gen_range(0..legal.len())];
                return Ok(Some(vec![uci_string(mv)]));
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::position_from_fen;
    use crate::book_cache::{NoBook, WeightedMove};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use training_core::{AnalysisResult, CoreError, GameResult, Score, Variation};

    type Reply = Box<dyn FnMut(&Chess, Option<&[String]>) -> Vec<(String, Score)>>;

    /// Engine stand-in driven by a closure.
    struct Scripted {
        reply: Reply,
        calls: Vec<Option<Vec<String>>>,
    }

    impl Scripted {
        fn new(reply: impl FnMut(&Chess, Option<&[String]>) -> Vec<(String, Score)> + 'static) -> Self {
            Self {
                reply: Box::new(reply),
                calls: Vec::new(),
            }
        }

        /// Always plays the given moves in turn.
        fn moves(moves: &[&str], score: Score) -> Self {
            let mut queue: Vec<String> = moves.iter().rev().map(|m| m.to_string()).collect();
            Self::new(move |_, _| match queue.pop() {
                Some(mv) => vec![(mv, score)],
                None => Vec::new(),
            })
        }

        /// Plays the first root move if restricted, else the first legal
        /// move, for `budget` calls.
        fn follower(budget: usize) -> Self {
            let mut left = budget;
            Self::new(move |pos, root| {
                if left == 0 {
                    return Vec::new();
                }
                left -= 1;
                let mv = match root {
                    Some(moves) => moves[0].clone(),
                    None => uci_string(&pos.legal_moves()[0]),
                };
                vec![(mv, Score::Cp(0))]
            })
        }
    }

    impl Analyzer for Scripted {
        async fn analyze(
            &mut self,
            pos: &Chess,
            _limit: SearchLimit,
            _multipv: u32,
            root_moves: Option<&[String]>,
        ) -> Result<AnalysisResult, WorkerError> {
            self.calls.push(root_moves.map(|m| m.to_vec()));
            let variations = (self.reply)(pos, root_moves)
                .into_iter()
                .map(|(mv, score)| Variation {
                    moves: vec![mv],
                    score,
                })
                .collect();
            Ok(AnalysisResult::new(variations))
        }
    }

    struct FixedBook(Vec<WeightedMove>);

    impl BookLookup for FixedBook {
        fn lookup(&self, _pos: &Chess) -> Vec<WeightedMove> {
            self.0.clone()
        }
    }

    fn settings(mode: SelectionMode) -> DriverSettings {
        DriverSettings {
            limit: SearchLimit::Nodes(1),
            multipv: 1,
            mode,
            move_cutoff: 30,
            book_plies: 0,
            win_threshold: 100,
        }
    }

    async fn play(
        fen: &str,
        white: &mut Scripted,
        black: &mut Scripted,
        settings: &DriverSettings,
    ) -> Result<GameRecord, WorkerError> {
        let mut rng = StdRng::seed_from_u64(7);
        let start = position_from_fen(fen).unwrap();
        GameDriver::new(white, black, &NoBook, settings)
            .play_from(start, &mut rng)
            .await
    }

    #[tokio::test]
    async fn test_mate_in_one() {
        let mut white = Scripted::moves(&["a1a8"], Score::Mate(1));
        let mut black = Scripted::moves(&[], Score::Cp(0));
        let game = play(
            "6k1/5ppp/8/8/8/8/8/R5K1 w - - 0 1",
            &mut white,
            &mut black,
            &settings(SelectionMode::Best),
        )
        .await
        .unwrap();

        assert_eq!(game.len(), 1);
        assert_eq!(game.result(), Some(GameResult::WhiteWins));
        assert_eq!(game.plies()[0].mv, "a1a8");
        assert!(black.calls.is_empty());
    }

    #[tokio::test]
    async fn test_fivefold_repetition() {
        let shuffle = ["g1f3", "f3g1", "g1f3", "f3g1", "g1f3", "f3g1", "g1f3", "f3g1"];
        let reply = ["g8f6", "f6g8", "g8f6", "f6g8", "g8f6", "f6g8", "g8f6", "f6g8"];
        let mut white = Scripted::moves(&shuffle, Score::Cp(20));
        let mut black = Scripted::moves(&reply, Score::Cp(-20));
        let game = play(
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
            &mut white,
            &mut black,
            &settings(SelectionMode::Best),
        )
        .await
        .unwrap();

        assert_eq!(game.len(), 16);
        assert_eq!(game.result(), Some(GameResult::Draw));
    }

    #[tokio::test]
    async fn test_seventy_five_move_rule() {
        let mut white = Scripted::moves(&["a1a2"], Score::Cp(900));
        let mut black = Scripted::moves(&[], Score::Cp(0));
        let game = play(
            "7k/8/8/8/8/8/8/R3K3 w Q - 149 100",
            &mut white,
            &mut black,
            &settings(SelectionMode::Best),
        )
        .await
        .unwrap();

        assert_eq!(game.len(), 1);
        assert_eq!(game.result(), Some(GameResult::Draw));
    }

    #[tokio::test]
    async fn test_insufficient_material() {
        let mut white = Scripted::moves(&["a1b2"], Score::Cp(0));
        let mut black = Scripted::moves(&[], Score::Cp(0));
        let game = play(
            "7k/8/8/8/8/8/1p6/K7 w - - 0 1",
            &mut white,
            &mut black,
            &settings(SelectionMode::Best),
        )
        .await
        .unwrap();

        assert_eq!(game.result(), Some(GameResult::Draw));
    }

    #[tokio::test]
    async fn test_stalemate_is_draw_despite_score() {
        let mut white = Scripted::moves(&["f1f7"], Score::Cp(2000));
        let mut black = Scripted::moves(&[], Score::Cp(0));
        let game = play(
            "7k/8/6K1/8/8/8/8/5Q2 w - - 0 1",
            &mut white,
            &mut black,
            &settings(SelectionMode::Best),
        )
        .await
        .unwrap();

        assert_eq!(game.len(), 1);
        assert_eq!(game.result(), Some(GameResult::Draw));
    }

    #[tokio::test]
    async fn test_empty_analysis_is_protocol_error() {
        let mut white = Scripted::moves(&[], Score::Cp(0));
        let mut black = Scripted::moves(&[], Score::Cp(0));
        let err = play(
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
            &mut white,
            &mut black,
            &settings(SelectionMode::Best),
        )
        .await
        .unwrap_err();

        match err {
            WorkerError::Ply { ply, source, .. } => {
                assert_eq!(ply, 1);
                assert!(matches!(*source, WorkerError::EngineProtocol(_)));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[tokio::test]
    async fn test_illegal_engine_move() {
        let mut white = Scripted::moves(&["e2e4"], Score::Cp(0));
        let mut black = Scripted::moves(&["e7e4"], Score::Cp(0));
        let err = play(
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
            &mut white,
            &mut black,
            &settings(SelectionMode::Best),
        )
        .await
        .unwrap_err();

        let message = err.to_string();
        match err {
            WorkerError::Ply { ply, fen, source } => {
                assert_eq!(ply, 2);
                assert_eq!(fen, "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1");
                assert!(matches!(*source, WorkerError::IllegalMove(_)));
            }
            other => panic!("unexpected error {other}"),
        }
        assert!(message.starts_with("ply 2 at "), "{message}");
        assert!(message.contains("e7e4"), "{message}");
    }

    #[tokio::test]
    async fn test_selection_failure_names_ply_and_scores() {
        let mut white = Scripted::moves(&["e2e4"], Score::Cp(35));
        let mut black = Scripted::moves(&[], Score::Cp(0));
        let err = play(
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
            &mut white,
            &mut black,
            &settings(SelectionMode::Softmax),
        )
        .await
        .unwrap_err();

        let message = err.to_string();
        assert!(message.starts_with("ply 1 at rnbqkbnr/"), "{message}");
        assert!(message.contains("35"), "{message}");
        match err {
            WorkerError::Ply { source, .. } => {
                assert!(matches!(*source, WorkerError::Core(CoreError::Selection(_))));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[tokio::test]
    async fn test_terminal_start_rejected() {
        let mut white = Scripted::follower(1);
        let mut black = Scripted::follower(1);
        let err = play(
            "7k/8/8/8/8/8/8/K7 w - - 0 1",
            &mut white,
            &mut black,
            &settings(SelectionMode::Best),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, WorkerError::Config(_)));
    }

    #[tokio::test]
    async fn test_book_restricts_root() {
        let mut white = Scripted::follower(2);
        let mut black = Scripted::follower(1);
        let book = FixedBook(vec![WeightedMove {
            uci: "e2e4".into(),
            weight: 3,
        }]);
        let mut settings = settings(SelectionMode::Best);
        settings.book_plies = 1;
        let start = position_from_fen("7k/8/8/8/8/8/4P3/K7 w - - 0 1").unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let err = GameDriver::new(&mut white, &mut black, &book, &settings)
            .play_from(start, &mut rng)
            .await
            .unwrap_err();

        assert!(matches!(err, WorkerError::EngineProtocol(_)));
        assert_eq!(white.calls[0], Some(vec!["e2e4".to_string()]));
        assert_eq!(white.calls[1], None);
        assert_eq!(black.calls[0], None);
    }

    #[tokio::test]
    async fn test_random_mode_restricts_before_cutoff() {
        let mut white = Scripted::follower(2);
        let mut black = Scripted::follower(1);
        let mut settings = settings(SelectionMode::Random);
        settings.move_cutoff = 2;
        let mut rng = StdRng::seed_from_u64(3);
        let start = position_from_fen("7k/8/8/8/8/8/R7/K7 w - - 0 1").unwrap();
        let _ = GameDriver::new(&mut white, &mut black, &NoBook, &settings)
            .play_from(start, &mut rng)
            .await;

        // Full move 1 is restricted to one random legal move, full move 2 is not
        assert_eq!(white.calls[0].as_ref().map(Vec::len), Some(1));
        assert_eq!(black.calls[0].as_ref().map(Vec::len), Some(1));
        assert_eq!(white.calls[1], None);
    }

    #[test]
    fn test_mode_override_after_cutoff() {
        let settings = settings(SelectionMode::Softmax);
        assert_eq!(settings.mode_at(30), SelectionMode::Softmax);
        assert_eq!(settings.mode_at(31), SelectionMode::Best);
    }
}
