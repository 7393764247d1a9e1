//! PGN rendering of generated games.

use shakmaty::fen::Fen;
use shakmaty::san::San;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Color, Position};

use crate::error::CoreError;
use crate::game::GameRecord;
use crate::score::Score;

const LINE_WIDTH: usize = 80;
const STANDARD_START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Seven Tag Roster minus the result, which comes from the game.
#[derive(Debug, Clone)]
pub struct PgnHeaders {
    pub event: String,
    pub site: String,
    pub date: String,
    pub round: u64,
    pub white: String,
    pub black: String,
}

impl PgnHeaders {
    /// Headers for a generated game, dated today.
    pub fn generated(round: u64, site: &str, white: &str, black: &str) -> Self {
        Self {
            event: "Game Generation".to_string(),
            site: site.to_string(),
            date: chrono::Local::now().format("%Y.%m.%d").to_string(),
            round,
            white: white.to_string(),
            black: black.to_string(),
        }
    }
}

/// `[%eval]` annotation from White's point of view.
pub fn eval_comment(score: Score, mover: Color) -> String {
    match score.white_pov(mover) {
        Score::Cp(cp) => format!("[%eval {:.2}]", f64::from(cp) / 100.0),
        Score::Mate(n) => format!("[%eval #{n}]"),
    }
}

/// Parse an `[%eval ...]` annotation back into a White-relative score.
pub fn parse_eval_comment(comment: &str) -> Option<Score> {
    let start = comment.find("[%eval")? + "[%eval".len();
    let rest = &comment[start..];
    let end = rest.find(']')?;
    let value = rest[..end].trim();
    if let Some(mate) = value.strip_prefix('#') {
        return mate.parse().ok().map(Score::Mate);
    }
    let pawns: f64 = value.parse().ok()?;
    Some(Score::Cp((pawns * 100.0).round() as i32))
}

fn parse_position(fen: &str) -> Result<Chess, CoreError> {
    let parsed: Fen = fen
        .parse()
        .map_err(|e| CoreError::InvalidRecord(format!("bad FEN '{fen}': {e}")))?;
    parsed
        .into_position(CastlingMode::Standard)
        .map_err(|e| CoreError::InvalidRecord(format!("illegal FEN '{fen}': {e}")))
}

/// Render a finished game as PGN text, terminated by a blank line.
pub fn render_pgn(game: &GameRecord, headers: &PgnHeaders) -> Result<String, CoreError> {
    let result = game
        .result()
        .ok_or_else(|| CoreError::InvalidRecord("game has no result".into()))?;

    let mut out = String::new();
    out.push_str(&format!("[Event \"{}\"]\n", headers.event));
    out.push_str(&format!("[Site \"{}\"]\n", headers.site));
    out.push_str(&format!("[Date \"{}\"]\n", headers.date));
    out.push_str(&format!("[Round \"{}\"]\n", headers.round));
    out.push_str(&format!("[White \"{}\"]\n", headers.white));
    out.push_str(&format!("[Black \"{}\"]\n", headers.black));
    out.push_str(&format!("[Result \"{}\"]\n", result.pgn_token()));
    if let Some(first) = game.plies().first() {
        if first.fen != STANDARD_START_FEN {
            out.push_str("[SetUp \"1\"]\n");
            out.push_str(&format!("[FEN \"{}\"]\n", first.fen));
        }
    }
    out.push('\n');

    let mut tokens: Vec<String> = Vec::new();
    for (i, ply) in game.plies().iter().enumerate() {
        let mut pos = parse_position(&ply.fen)?;
        let uci: UciMove = ply
            .mv
            .parse()
            .map_err(|e| CoreError::InvalidRecord(format!("bad move '{}': {e}", ply.mv)))?;
        let mv = uci.to_move(&pos).map_err(|e| {
            CoreError::InvalidRecord(format!("illegal move '{}' at ply {}: {e}", ply.mv, ply.ply))
        })?;

        let number = pos.fullmoves();
        match pos.turn() {
            Color::White => tokens.push(format!("{number}.")),
            Color::Black if i == 0 => tokens.push(format!("{number}...")),
            Color::Black => {}
        }

        let san = San::from_move(&pos, mv.clone());
        pos.play_unchecked(mv);
        let suffix = if pos.is_checkmate() {
            "#"
        } else if pos.is_check() {
            "+"
        } else {
            ""
        };
        tokens.push(format!("{san}{suffix}"));
        tokens.push(format!("{{ {} }}", eval_comment(ply.score, ply.mover)));
    }
    tokens.push(result.pgn_token().to_string());

    let mut line_len = 0;
    for token in tokens {
        if line_len > 0 && line_len + 1 + token.len() > LINE_WIDTH {
            out.push('\n');
            line_len = 0;
        } else if line_len > 0 {
            out.push(' ');
            line_len += 1;
        }
        line_len += token.len();
        out.push_str(&token);
    }
    out.push_str("\n\n");

    Ok(out)
}
