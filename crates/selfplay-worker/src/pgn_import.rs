//! Reads annotated PGN back into game records.
//!
//! Every move must carry an `[%eval]` comment and the game a decisive or
//! drawn Result tag; other games are skipped.

use std::io::Read;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use pgn_reader::{RawComment, RawTag, Reader, SanPlus, Visitor};
use regex::Regex;
use shakmaty::{Chess, Color, Position};
use tracing::{debug, info};
use training_core::pgn::parse_eval_comment;
use training_core::{GameRecord, GameResult};

use crate::board::{fen_string, position_from_fen, uci_string};
use crate::error::WorkerError;

/// Outcome of reading one game.
#[derive(Debug)]
pub enum Imported {
    Game(GameRecord),
    Skipped(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub games: u64,
    pub skipped: u64,
}

#[derive(Default)]
pub struct ImportTags {
    result: Option<GameResult>,
    fen: Option<String>,
}

/// A played move still waiting for its eval comment.
struct PendingMove {
    fen: String,
    mover: Color,
    uci: String,
}

pub struct ImportState {
    board: Chess,
    game: GameRecord,
    pending: Option<PendingMove>,
    result: GameResult,
}

impl ImportState {
    fn unscored(&self) -> String {
        format!("move {} has no eval", self.game.len() + 1)
    }
}

/// pgn-reader visitor producing one [`Imported`] per game.
#[derive(Debug, Default)]
pub struct GameImporter;

impl Visitor for GameImporter {
    type Tags = ImportTags;
    type Movetext = ImportState;
    type Output = Imported;

    fn begin_tags(&mut self) -> ControlFlow<Imported, ImportTags> {
        ControlFlow::Continue(ImportTags::default())
    }

    fn tag(&mut self, tags: &mut ImportTags, name: &[u8], value: RawTag<'_>) -> ControlFlow<Imported> {
        match name {
            b"Result" => {
                tags.result = GameResult::from_pgn_token(value.decode_utf8_lossy().as_ref());
            }
            b"FEN" => tags.fen = Some(value.decode_utf8_lossy().into_owned()),
            _ => {}
        }
        ControlFlow::Continue(())
    }

    fn begin_movetext(&mut self, tags: ImportTags) -> ControlFlow<Imported, ImportState> {
        let Some(result) = tags.result else {
            return ControlFlow::Break(Imported::Skipped("no decisive or drawn result".into()));
        };
        let board = match tags.fen {
            Some(fen) => match position_from_fen(&fen) {
                Ok(board) => board,
                Err(e) => return ControlFlow::Break(Imported::Skipped(e.to_string())),
            },
            None => Chess::default(),
        };

        ControlFlow::Continue(ImportState {
            board,
            game: GameRecord::new(),
            pending: None,
            result,
        })
    }

    fn san(&mut self, state: &mut ImportState, san_plus: SanPlus) -> ControlFlow<Imported> {
        if state.pending.is_some() {
            return ControlFlow::Break(Imported::Skipped(state.unscored()));
        }

        let mv = match san_plus.san.to_move(&state.board) {
            Ok(mv) => mv,
            Err(e) => {
                return ControlFlow::Break(Imported::Skipped(format!(
                    "illegal move {} at ply {}: {e}",
                    san_plus,
                    state.game.len() + 1
                )))
            }
        };

        state.pending = Some(PendingMove {
            fen: fen_string(&state.board),
            mover: state.board.turn(),
            uci: uci_string(&mv),
        });
        state.board.play_unchecked(mv);
        ControlFlow::Continue(())
    }

    fn comment(&mut self, state: &mut ImportState, comment: RawComment<'_>) -> ControlFlow<Imported> {
        let text = String::from_utf8_lossy(comment.as_bytes());
        let Some(score) = parse_eval_comment(&text) else {
            return ControlFlow::Continue(());
        };
        let Some(pending) = state.pending.take() else {
            return ControlFlow::Continue(());
        };

        // Comments are from White's side; records are relative to the mover
        let score = score.white_pov(pending.mover);
        match state.game.push_ply(pending.fen, pending.mover, pending.uci, score) {
            Ok(_) => ControlFlow::Continue(()),
            Err(e) => ControlFlow::Break(Imported::Skipped(e.to_string())),
        }
    }

    fn end_game(&mut self, mut state: ImportState) -> Imported {
        if state.pending.is_some() {
            return Imported::Skipped(state.unscored());
        }
        if state.game.is_empty() {
            return Imported::Skipped("no moves".into());
        }
        match state.game.finish(state.result) {
            Ok(()) => Imported::Game(state.game),
            Err(e) => Imported::Skipped(e.to_string()),
        }
    }
}

/// Read every game from `input`, handing complete ones to `on_game`.
pub fn import_games<R, F>(input: R, mut on_game: F) -> Result<ImportSummary, WorkerError>
where
    R: Read,
    F: FnMut(GameRecord) -> Result<(), WorkerError>,
{
    let mut reader = Reader::new(input);
    let mut importer = GameImporter;
    let mut summary = ImportSummary::default();

    while let Some(imported) = reader.read_game(&mut importer)? {
        match imported {
            Imported::Game(game) => {
                summary.games += 1;
                on_game(game)?;
                if summary.games % 10_000 == 0 {
                    info!(games = summary.games, skipped = summary.skipped, "Import progress");
                }
            }
            Imported::Skipped(reason) => {
                summary.skipped += 1;
                debug!(game = summary.games + summary.skipped, reason = %reason, "Skipping game");
            }
        }
    }

    Ok(summary)
}

static FILE_INDEX: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"-(\d+)\.pgn$").ok());

/// Numeric suffix of generated files (`main-12.pgn` -> 12), 0 otherwise.
pub fn pgn_file_index(path: &Path) -> u64 {
    let name = path.to_string_lossy();
    FILE_INDEX
        .as_ref()
        .and_then(|re| re.captures(&name))
        .and_then(|caps| caps[1].parse().ok())
        .unwrap_or(0)
}

/// Files matching `pattern`, ordered by their numeric suffix.
pub fn expand_pgn_pattern(pattern: &str) -> Result<Vec<PathBuf>, WorkerError> {
    let mut files: Vec<PathBuf> = glob::glob(pattern)
        .map_err(|e| WorkerError::Config(format!("bad pattern '{pattern}': {e}")))?
        .filter_map(|p| p.ok())
        .collect();
    files.sort_by_key(|path| (pgn_file_index(path), path.clone()));
    Ok(files)
}
