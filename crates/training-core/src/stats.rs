//! Per-ply evaluation statistics over a plain record file.

use std::collections::BTreeMap;
use std::io::BufRead;

use tracing::info;

use crate::error::CoreError;

/// Absolute scores at or above this are mate artifacts and stay out of the max.
pub const SANITY_CEILING: i64 = 30000;

/// Positions between progress reports.
pub const PROGRESS_INTERVAL: u64 = 100_000;

fn round_to(x: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (x * factor).round() / factor
}

/// Absolute scores bucketed by ply.
#[derive(Debug, Default)]
pub struct PlyStats {
    buckets: BTreeMap<u32, Vec<i64>>,
    max_score: Option<i64>,
    last_score: Option<i64>,
    pending: Option<(u32, i64)>,
    positions: u64,
    line_no: usize,
}

impl PlyStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stream a whole file.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, CoreError> {
        let mut stats = Self::new();
        for line in reader.lines() {
            stats.push_line(&line?)?;
        }
        Ok(stats)
    }

    /// Feed one line; only `score`, `ply` and `e` lines matter.
    ///
    /// A (ply, score) pair is committed when its group's `e` terminator
    /// arrives, so a truncated trailing group is never counted.
    pub fn push_line(&mut self, line: &str) -> Result<(), CoreError> {
        self.line_no += 1;
        let mut parts = line.split_whitespace();
        let key = parts.next().unwrap_or_default();
        let value = parts.next().unwrap_or_default();

        match key {
            "score" => {
                let score: i64 = value
                    .parse()
                    .map_err(|_| self.malformed(format!("unparsable score '{value}'")))?;
                self.last_score = Some(score);
            }
            "ply" => {
                let ply: u32 = value
                    .parse()
                    .map_err(|_| self.malformed(format!("unparsable ply '{value}'")))?;
                let score = self
                    .last_score
                    .take()
                    .ok_or_else(|| self.malformed("ply line without a preceding score".into()))?;
                self.pending = Some((ply, score));
            }
            "e" => {
                if let Some((ply, score)) = self.pending.take() {
                    self.push(ply, score);
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Record one (ply, score) observation.
    pub fn push(&mut self, ply: u32, score: i64) {
        let magnitude = score.abs();
        self.buckets.entry(ply).or_default().push(magnitude);
        if magnitude < SANITY_CEILING {
            self.max_score = Some(self.max_score.map_or(magnitude, |m| m.max(magnitude)));
        }
        self.positions += 1;
        if self.positions % PROGRESS_INTERVAL == 0 {
            info!(positions = self.positions, "Positions parsed");
        }
    }

    fn malformed(&self, reason: String) -> CoreError {
        CoreError::MalformedRecord {
            line: self.line_no,
            reason,
        }
    }

    pub fn buckets(&self) -> &BTreeMap<u32, Vec<i64>> {
        &self.buckets
    }

    pub fn positions(&self) -> u64 {
        self.positions
    }

    /// Largest absolute score below [`SANITY_CEILING`].
    pub fn max_score(&self) -> Option<i64> {
        self.max_score
    }

    /// Mean absolute score per ply, rounded to two decimals.
    pub fn per_ply_means(&self) -> Vec<(u32, f64)> {
        self.buckets
            .iter()
            .filter(|(_, scores)| !scores.is_empty())
            .map(|(&ply, scores)| {
                let sum: i64 = scores.iter().sum();
                (ply, round_to(sum as f64 / scores.len() as f64, 2))
            })
            .collect()
    }

    /// Mean of the per-ply means over plies strictly after `after_ply`,
    /// rounded to an integer.
    pub fn mean_after(&self, after_ply: u32) -> Option<f64> {
        let means: Vec<f64> = self
            .per_ply_means()
            .into_iter()
            .filter(|&(ply, _)| ply > after_ply)
            .map(|(_, mean)| mean)
            .collect();
        if means.is_empty() {
            return None;
        }
        Some(round_to(means.iter().sum::<f64>() / means.len() as f64, 0))
    }
}
