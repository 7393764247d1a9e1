//! Flat six-line training record format.
//!
//! ```text
//! fen <FEN>
//! move <uci>
//! score <int>
//! ply <int>
//! result <-1|0|1>
//! e
//! ```

use std::fmt;
use std::io::{BufRead, Lines, Write};

use shakmaty::fen::Fen;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess};
use tracing::{debug, warn};

use crate::error::CoreError;

/// Ceiling for every scaled training score.
pub const MAX_EVAL: i32 = 3875;

/// One flat training example.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionRecord {
    pub fen: String,
    /// Move in UCI notation
    pub mv: String,
    pub score: i32,
    pub ply: u32,
    /// Game result from the point of view of the side to move
    pub result: i8,
}

impl PositionRecord {
    pub fn new(
        fen: impl Into<String>,
        mv: impl Into<String>,
        score: i32,
        ply: u32,
        result: i8,
    ) -> Result<Self, CoreError> {
        if score.abs() > MAX_EVAL {
            return Err(CoreError::InvalidRecord(format!(
                "score {score} exceeds MAX_EVAL {MAX_EVAL}"
            )));
        }
        Self::raw(fen, mv, score, ply, result)
    }

    /// Record carrying a raw engine score, which may exceed [`MAX_EVAL`].
    pub fn raw(
        fen: impl Into<String>,
        mv: impl Into<String>,
        score: i32,
        ply: u32,
        result: i8,
    ) -> Result<Self, CoreError> {
        if !(-1..=1).contains(&result) {
            return Err(CoreError::InvalidRecord(format!("result {result} not in -1..=1")));
        }
        Ok(Self {
            fen: fen.into(),
            mv: mv.into(),
            score,
            ply,
            result,
        })
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        write!(writer, "{self}")
    }
}

impl fmt::Display for PositionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "fen {}", self.fen)?;
        writeln!(f, "move {}", self.mv)?;
        writeln!(f, "score {}", self.score)?;
        writeln!(f, "ply {}", self.ply)?;
        writeln!(f, "result {}", self.result)?;
        writeln!(f, "e")
    }
}

/// Append records to `writer` in order.
pub fn write_records<'a, W, I>(writer: &mut W, records: I) -> std::io::Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a PositionRecord>,
{
    for record in records {
        record.write_to(writer)?;
    }
    Ok(())
}

/// Render records into one buffer so a whole game can be appended at once.
pub fn render_records<'a, I>(records: I) -> String
where
    I: IntoIterator<Item = &'a PositionRecord>,
{
    records.into_iter().map(|r| r.to_string()).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// Abort on the first malformed group
    Strict,
    /// Skip malformed groups and count them
    Lenient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Fen,
    Move,
    Score,
    Ply,
    Result,
    End,
}

impl Field {
    fn key(self) -> &'static str {
        match self {
            Field::Fen => "fen",
            Field::Move => "move",
            Field::Score => "score",
            Field::Ply => "ply",
            Field::Result => "result",
            Field::End => "e",
        }
    }
}

/// Fields of a group collected so far, in order.
#[derive(Debug, Default)]
struct PendingRecord {
    fen: Option<(String, Chess)>,
    mv: Option<String>,
    score: Option<i32>,
    ply: Option<u32>,
    result: Option<i8>,
}

impl PendingRecord {
    fn expected(&self) -> Field {
        if self.fen.is_none() {
            Field::Fen
        } else if self.mv.is_none() {
            Field::Move
        } else if self.score.is_none() {
            Field::Score
        } else if self.ply.is_none() {
            Field::Ply
        } else if self.result.is_none() {
            Field::Result
        } else {
            Field::End
        }
    }

    fn is_empty(&self) -> bool {
        self.fen.is_none()
    }

    fn finish(self, raw_scores: bool) -> Result<PositionRecord, String> {
        match (self.fen, self.mv, self.score, self.ply, self.result) {
            (Some((fen, _)), Some(mv), Some(score), Some(ply), Some(result)) => {
                let record = if raw_scores {
                    PositionRecord::raw(fen, mv, score, ply, result)
                } else {
                    PositionRecord::new(fen, mv, score, ply, result)
                };
                record.map_err(|e| e.to_string())
            }
            _ => Err("terminator before all fields were set".into()),
        }
    }
}

fn parse_fen(value: &str) -> Result<Chess, String> {
    let fen: Fen = value
        .parse()
        .map_err(|e| format!("unparsable FEN '{value}': {e}"))?;
    fen.into_position::<Chess>(CastlingMode::Standard)
        .map_err(|e| format!("illegal FEN '{value}': {e}"))
}

fn parse_int<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("unparsable {key} value '{value}'"))
}

/// Streaming parser over a plain record file.
///
/// Yields complete records only; a trailing group without its `e`
/// terminator is dropped. Records whose ply is below `min_ply` are
/// filtered out. Scores must lie within [`MAX_EVAL`] unless the reader
/// was built with [`RecordReader::with_raw_scores`].
pub struct RecordReader<R> {
    lines: Lines<R>,
    line_no: usize,
    mode: ParseMode,
    min_ply: u32,
    raw_scores: bool,
    pending: PendingRecord,
    skipping: bool,
    malformed: u64,
    failed: bool,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(reader: R, mode: ParseMode) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
            mode,
            min_ply: 0,
            raw_scores: false,
            pending: PendingRecord::default(),
            skipping: false,
            malformed: 0,
            failed: false,
        }
    }

    /// Drop records whose ply is below `min_ply`.
    pub fn with_min_ply(mut self, min_ply: u32) -> Self {
        self.min_ply = min_ply;
        self
    }

    /// Accept unbounded raw engine scores.
    pub fn with_raw_scores(mut self) -> Self {
        self.raw_scores = true;
        self
    }

    /// Number of groups skipped in lenient mode.
    pub fn malformed(&self) -> u64 {
        self.malformed
    }

    /// Feed one non-empty line. Returns a record when a group completes.
    fn accept(&mut self, line: &str) -> Result<Option<PositionRecord>, String> {
        let (key, value) = match line.split_once(char::is_whitespace) {
            Some((key, value)) => (key, value.trim()),
            None => (line, ""),
        };

        let expected = self.pending.expected();
        if key != expected.key() {
            return Err(format!(
                "expected '{}' line, found '{key}'",
                expected.key()
            ));
        }

        match expected {
            Field::Fen => {
                let pos = parse_fen(value)?;
                self.pending.fen = Some((value.to_string(), pos));
            }
            Field::Move => {
                let uci: UciMove = value
                    .parse()
                    .map_err(|e| format!("unparsable move '{value}': {e}"))?;
                if let Some((_, pos)) = &self.pending.fen {
                    uci.to_move(pos)
                        .map_err(|e| format!("illegal move '{value}': {e}"))?;
                }
                self.pending.mv = Some(value.to_string());
            }
            Field::Score => self.pending.score = Some(parse_int(key, value)?),
            Field::Ply => self.pending.ply = Some(parse_int(key, value)?),
            Field::Result => self.pending.result = Some(parse_int(key, value)?),
            Field::End => {
                let pending = std::mem::take(&mut self.pending);
                return pending.finish(self.raw_scores).map(Some);
            }
        }
        Ok(None)
    }

    /// Handle a malformed group in lenient mode.
    fn recover(&mut self, line: &str) {
        self.malformed += 1;
        let group_started = !self.pending.is_empty();
        self.pending = PendingRecord::default();
        let key = line.split_whitespace().next().unwrap_or_default();
        if key == Field::Fen.key() && group_started {
            // The previous group lost its tail; this line opens the next one.
            self.restart(line);
        } else {
            self.skipping = key != Field::End.key();
        }
    }

    /// Begin a fresh group at a `fen` line.
    fn restart(&mut self, line: &str) {
        self.skipping = false;
        self.pending = PendingRecord::default();
        if let Err(reason) = self.accept(line) {
            warn!(line = self.line_no, %reason, "Malformed record, skipping group");
            self.malformed += 1;
            self.skipping = true;
        }
    }
}

impl<R: BufRead> Iterator for RecordReader<R> {
    type Item = Result<PositionRecord, CoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        loop {
            let line = match self.lines.next() {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    self.failed = true;
                    return Some(Err(e.into()));
                }
                None => {
                    if !self.pending.is_empty() {
                        debug!(line = self.line_no, "Discarding trailing incomplete record");
                        self.pending = PendingRecord::default();
                    }
                    return None;
                }
            };
            self.line_no += 1;

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if self.skipping {
                if line == Field::End.key() {
                    self.skipping = false;
                } else if line.starts_with("fen ") {
                    let line = line.to_string();
                    self.restart(&line);
                }
                continue;
            }

            match self.accept(line) {
                Ok(Some(record)) => {
                    if record.ply < self.min_ply {
                        continue;
                    }
                    return Some(Ok(record));
                }
                Ok(None) => {}
                Err(reason) => match self.mode {
                    ParseMode::Strict => {
                        self.failed = true;
                        return Some(Err(CoreError::MalformedRecord {
                            line: self.line_no,
                            reason,
                        }));
                    }
                    ParseMode::Lenient => {
                        warn!(line = self.line_no, %reason, "Malformed record, skipping group");
                        let line = line.to_string();
                        self.recover(&line);
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const START: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
    const AFTER_E4: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";

    fn parse(text: &str, mode: ParseMode) -> (Vec<Result<PositionRecord, CoreError>>, u64) {
        let mut reader = RecordReader::new(Cursor::new(text.to_string()), mode);
        let records: Vec<_> = reader.by_ref().collect();
        (records, reader.malformed())
    }

    #[test]
    fn test_record_format() {
        let record = PositionRecord::new(START, "e2e4", 120, 1, 1).unwrap();
        assert_eq!(
            record.to_string(),
            format!("fen {START}\nmove e2e4\nscore 120\nply 1\nresult 1\ne\n")
        );
    }

    #[test]
    fn test_record_bounds() {
        assert!(PositionRecord::new(START, "e2e4", MAX_EVAL, 1, 0).is_ok());
        assert!(PositionRecord::new(START, "e2e4", -MAX_EVAL - 1, 1, 0).is_err());
        assert!(PositionRecord::new(START, "e2e4", 0, 1, 2).is_err());
    }

    #[test]
    fn test_parse_written_records() {
        let records = vec![
            PositionRecord::new(START, "e2e4", 35, 1, 0).unwrap(),
            PositionRecord::new(AFTER_E4, "c7c5", -3875, 2, -1).unwrap(),
        ];
        let mut buf = Vec::new();
        write_records(&mut buf, &records).unwrap();

        let (parsed, malformed) = parse(&String::from_utf8(buf).unwrap(), ParseMode::Strict);
        let parsed: Vec<PositionRecord> = parsed.into_iter().map(Result::unwrap).collect();
        assert_eq!(parsed, records);
        assert_eq!(malformed, 0);
    }

    #[test]
    fn test_truncated_trailing_group_dropped() {
        let text = format!(
            "fen {START}\nmove e2e4\nscore 10\nply 1\nresult 0\ne\nfen {AFTER_E4}\nmove e7e5\nscore 5\nply 2\n"
        );
        let (parsed, _) = parse(&text, ParseMode::Strict);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].as_ref().unwrap().ply, 1);
    }

    #[test]
    fn test_strict_aborts_on_out_of_order() {
        let text = format!(
            "fen {START}\nscore 10\nmove e2e4\nply 1\nresult 0\ne\nfen {AFTER_E4}\nmove e7e5\nscore 5\nply 2\nresult 0\ne\n"
        );
        let (parsed, _) = parse(&text, ParseMode::Strict);
        assert_eq!(parsed.len(), 1);
        assert!(matches!(
            parsed[0],
            Err(CoreError::MalformedRecord { line: 2, .. })
        ));
    }

    #[test]
    fn test_lenient_skips_bad_groups() {
        let text = format!(
            "fen {START}\nscore 10\nmove e2e4\nply 1\nresult 0\ne\n\
             fen not/a/fen w - - 0 1\nmove e2e4\nscore 1\nply 1\nresult 0\ne\n\
             fen {START}\nmove e2e5\nscore 1\nply 1\nresult 0\ne\n\
             fen {AFTER_E4}\nmove e7e5\nscore 5\nply 2\nresult 0\ne\n"
        );
        let (parsed, malformed) = parse(&text, ParseMode::Lenient);
        assert_eq!(malformed, 3);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].as_ref().unwrap().mv, "e7e5");
    }

    #[test]
    fn test_lenient_restarts_on_early_fen() {
        // First group lost its terminator and result line
        let text = format!(
            "fen {START}\nmove e2e4\nscore 10\nply 1\n\
             fen {AFTER_E4}\nmove e7e5\nscore 5\nply 2\nresult 0\ne\n"
        );
        let (parsed, malformed) = parse(&text, ParseMode::Lenient);
        assert_eq!(malformed, 1);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].as_ref().unwrap().ply, 2);
    }

    #[test]
    fn test_min_ply_filter() {
        let text = format!(
            "fen {START}\nmove e2e4\nscore 10\nply 1\nresult 0\ne\n\
             fen {AFTER_E4}\nmove e7e5\nscore 5\nply 2\nresult 0\ne\n"
        );
        let reader = RecordReader::new(Cursor::new(text), ParseMode::Strict).with_min_ply(2);
        let parsed: Vec<_> = reader.map(Result::unwrap).collect();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].ply, 2);
    }

    #[test]
    fn test_raw_scores_accepted_only_when_enabled() {
        let text = format!(
            "fen {AFTER_E4}\nmove e7e5\nscore 5000\nply 2\nresult 1\ne\n\
             fen {START}\nmove e2e4\nscore 120\nply 1\nresult -1\ne\n"
        );

        let (bounded, malformed) = parse(&text, ParseMode::Lenient);
        assert_eq!(malformed, 1);
        assert_eq!(bounded.len(), 1);

        let reader = RecordReader::new(Cursor::new(text), ParseMode::Lenient).with_raw_scores();
        let raw: Vec<PositionRecord> = reader.map(Result::unwrap).collect();
        let scores: Vec<i32> = raw.iter().map(|r| r.score).collect();
        assert_eq!(scores, vec![5000, 120]);
        assert!(PositionRecord::raw(START, "e2e4", 31200, 1, 2).is_err());
    }
}
