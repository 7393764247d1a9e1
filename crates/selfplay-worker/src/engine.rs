//! UCI engine session (async I/O) and the analysis contract the driver uses.

use std::fmt;

use shakmaty::Chess;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::debug;
use training_core::{AnalysisResult, Score, Variation};

use crate::board::fen_string;
use crate::error::WorkerError;

/// Search limit for one analysis request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchLimit {
    Nodes(u64),
    Depth(u32),
}

impl SearchLimit {
    /// Pick the active limit; at most one may be set. Neither means one node.
    pub fn from_options(nodes: Option<u64>, depth: Option<u32>) -> Result<Self, WorkerError> {
        match (nodes.filter(|&n| n > 0), depth.filter(|&d| d > 0)) {
            (Some(n), Some(d)) => Err(WorkerError::Config(format!(
                "nodes ({n}) and depth ({d}) are mutually exclusive"
            ))),
            (Some(n), None) => Ok(SearchLimit::Nodes(n)),
            (None, Some(d)) => Ok(SearchLimit::Depth(d)),
            (None, None) => Ok(SearchLimit::Nodes(1)),
        }
    }
}

impl Default for SearchLimit {
    fn default() -> Self {
        SearchLimit::Nodes(1)
    }
}

impl fmt::Display for SearchLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchLimit::Nodes(n) => write!(f, "nodes {n}"),
            SearchLimit::Depth(d) => write!(f, "depth {d}"),
        }
    }
}

/// Anything that can rank candidate moves for a position.
#[allow(async_fn_in_trait)]
pub trait Analyzer {
    /// Ranked variations, best first. `root_moves` restricts the search to
    /// the given UCI moves.
    async fn analyze(
        &mut self,
        pos: &Chess,
        limit: SearchLimit,
        multipv: u32,
        root_moves: Option<&[String]>,
    ) -> Result<AnalysisResult, WorkerError>;
}

/// One `info ... pv ...` line as reported by the engine.
#[derive(Debug, Clone, Default)]
struct PvLine {
    pv: Vec<String>,
    score: Option<Score>,
}

/// UCI engine process
pub struct UciEngine {
    name: String,
    process: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    multipv: u32,
}

impl UciEngine {
    /// Spawn the engine process and initialize UCI
    pub async fn new(path: &str) -> Result<Self, WorkerError> {
        let mut process = Command::new(path)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| WorkerError::Engine(format!("Failed to spawn {path}: {e}")))?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| WorkerError::Engine(format!("{path}: stdin not captured")))?;
        let stdout = BufReader::new(
            process
                .stdout
                .take()
                .ok_or_else(|| WorkerError::Engine(format!("{path}: stdout not captured")))?,
        );

        let mut engine = Self {
            name: path.to_string(),
            process,
            stdin,
            stdout,
            multipv: 1,
        };

        engine.send("uci").await?;
        engine.wait_for("uciok").await?;
        engine.send("setoption name UCI_AnalyseMode value true").await?;
        engine.send("isready").await?;
        engine.wait_for("readyok").await?;

        Ok(engine)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Send a command to the engine
    async fn send(&mut self, cmd: &str) -> Result<(), WorkerError> {
        debug!(cmd, "engine <");
        self.stdin
            .write_all(format!("{cmd}\n").as_bytes())
            .await
            .map_err(|e| WorkerError::Engine(format!("Failed to write to {}: {e}", self.name)))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| WorkerError::Engine(format!("Failed to flush stdin: {e}")))?;
        Ok(())
    }

    /// Read one trimmed line; end of stream means the engine died.
    async fn read_line(&mut self, line: &mut String) -> Result<(), WorkerError> {
        line.clear();
        let n = self
            .stdout
            .read_line(line)
            .await
            .map_err(|e| WorkerError::Engine(format!("Failed to read from {}: {e}", self.name)))?;
        if n == 0 {
            return Err(WorkerError::Engine(format!("{} closed its output", self.name)));
        }
        debug!(line = line.trim(), "engine >");
        Ok(())
    }

    /// Wait for a specific response line
    async fn wait_for(&mut self, expected: &str) -> Result<(), WorkerError> {
        let mut line = String::new();
        loop {
            self.read_line(&mut line).await?;
            if line.trim() == expected {
                return Ok(());
            }
        }
    }

    async fn set_multipv(&mut self, multipv: u32) -> Result<(), WorkerError> {
        if multipv != self.multipv {
            self.send(&format!("setoption name MultiPV value {multipv}")).await?;
            self.multipv = multipv;
        }
        Ok(())
    }

    /// Send quit command and wait for process to exit
    pub async fn quit(&mut self) {
        let _ = self.send("quit").await;
        let _ = self.process.wait().await;
    }
}

impl Analyzer for UciEngine {
    async fn analyze(
        &mut self,
        pos: &Chess,
        limit: SearchLimit,
        multipv: u32,
        root_moves: Option<&[String]>,
    ) -> Result<AnalysisResult, WorkerError> {
        let multipv = multipv.max(1);
        self.set_multipv(multipv).await?;

        let fen = fen_string(pos);
        self.send(&format!("position fen {fen}")).await?;
        self.send(&go_command(limit, root_moves)).await?;

        let mut lines: Vec<PvLine> = vec![PvLine::default(); multipv as usize];
        let mut line = String::new();

        loop {
            self.read_line(&mut line).await?;
            let trimmed = line.trim();

            if trimmed.starts_with("info") && trimmed.contains(" pv ") {
                // multipv index is 1-based
                let pv_idx = parse_multipv_index(trimmed).unwrap_or(1).max(1) - 1;
                if let Some(entry) = lines.get_mut(pv_idx as usize) {
                    if let Some(score) = parse_score(trimmed) {
                        entry.score = Some(score);
                    }
                    entry.pv = parse_pv(trimmed);
                }
            } else if trimmed.starts_with("bestmove") {
                break;
            }
        }

        to_analysis(lines, &fen)
    }
}

impl Drop for UciEngine {
    fn drop(&mut self) {
        // Best-effort synchronous kill in drop
        let _ = self.process.start_kill();
    }
}

fn go_command(limit: SearchLimit, root_moves: Option<&[String]>) -> String {
    let mut cmd = format!("go {limit}");
    if let Some(moves) = root_moves.filter(|m| !m.is_empty()) {
        cmd.push_str(" searchmoves ");
        cmd.push_str(&moves.join(" "));
    }
    cmd
}

/// Keep variations that have both a move and a score; the first one must.
fn to_analysis(lines: Vec<PvLine>, fen: &str) -> Result<AnalysisResult, WorkerError> {
    match lines.first() {
        Some(PvLine {
            score: Some(_),
            pv,
        }) if !pv.is_empty() => {}
        _ => {
            return Err(WorkerError::EngineProtocol(format!(
                "no score or mate for the best variation in {fen}"
            )))
        }
    }

    let variations = lines
        .into_iter()
        .filter_map(|line| match line.score {
            Some(score) if !line.pv.is_empty() => Some(Variation {
                moves: line.pv,
                score,
            }),
            _ => None,
        })
        .collect();

    Ok(AnalysisResult::new(variations))
}

/// Parse the value following `key` in an info line
fn parse_after<T: std::str::FromStr>(line: &str, key: &str) -> Option<T> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    for (i, part) in parts.iter().enumerate() {
        if *part == key && i + 1 < parts.len() {
            return parts[i + 1].parse().ok();
        }
        if *part == "pv" {
            break;
        }
    }
    None
}

/// Parse `score cp N` or `score mate N` from info line
fn parse_score(line: &str) -> Option<Score> {
    if let Some(cp) = parse_after(line, "cp") {
        return Some(Score::Cp(cp));
    }
    parse_after(line, "mate").map(Score::Mate)
}

/// Parse multipv index from info line
fn parse_multipv_index(line: &str) -> Option<u32> {
    parse_after(line, "multipv")
}

/// Parse PV moves from info line
fn parse_pv(line: &str) -> Vec<String> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let mut in_pv = false;
    let mut moves = Vec::new();

    for part in parts {
        if part == "pv" {
            in_pv = true;
            continue;
        }
        if in_pv {
            // PV ends at next keyword or end of line
            if part.starts_with("bmc") || part == "string" {
                break;
            }
            moves.push(part.to_string());
        }
    }

    moves
}
