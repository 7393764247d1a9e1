//! Move selection over ranked engine variations. Pure functions only.

use std::fmt;
use std::str::FromStr;

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use shakmaty::Color;

use crate::error::CoreError;
use crate::score::{AnalysisResult, Score, Variation};

/// Scores with a larger magnitude get zero softmax weight.
pub const SOFTMAX_GATE: f64 = 0.01;

/// Accepted deviation of the normalized weight sum from 1.
const NORMALIZATION_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    /// Always the first variation
    Best,
    /// Sample from the gated softmax over variation scores
    Softmax,
    /// Uniform over the returned variations
    Random,
}

impl FromStr for SelectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "best" => Ok(SelectionMode::Best),
            "softmax" => Ok(SelectionMode::Softmax),
            "random" => Ok(SelectionMode::Random),
            other => Err(format!(
                "invalid selection mode '{other}', expected best, softmax or random"
            )),
        }
    }
}

impl fmt::Display for SelectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SelectionMode::Best => "best",
            SelectionMode::Softmax => "softmax",
            SelectionMode::Random => "random",
        })
    }
}

/// Normalized sampling weights, one per variation.
///
/// A variation contributes `e^s` (White to move) or `e^-s` (Black to move)
/// when its score `s` satisfies `|s| <= SOFTMAX_GATE`, and nothing
/// otherwise. Mate scores are always outside the gate.
pub fn softmax_weights(analysis: &AnalysisResult, turn: Color) -> Result<Vec<f64>, CoreError> {
    if analysis.is_empty() {
        return Err(CoreError::Selection("no variations to select from".into()));
    }

    let raw: Vec<f64> = analysis
        .variations
        .iter()
        .map(|v| match v.score {
            Score::Cp(cp) => {
                let s = f64::from(cp);
                if s.abs() > SOFTMAX_GATE {
                    0.0
                } else {
                    match turn {
                        Color::White => s.exp(),
                        Color::Black => (-s).exp(),
                    }
                }
            }
            Score::Mate(_) => 0.0,
        })
        .collect();

    let total: f64 = raw.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        let scores: Vec<String> = analysis.variations.iter().map(|v| v.score.to_string()).collect();
        return Err(CoreError::Selection(format!(
            "softmax weights sum to {total} for scores [{}]",
            scores.join(", ")
        )));
    }

    let weights: Vec<f64> = raw.iter().map(|w| w / total).collect();
    let check: f64 = weights.iter().sum();
    if (check - 1.0).abs() > NORMALIZATION_TOLERANCE {
        return Err(CoreError::Selection(format!(
            "normalized softmax weights sum to {check}"
        )));
    }

    Ok(weights)
}

/// Choose one variation and return its first move with its score.
pub fn select<R: Rng + ?Sized>(
    analysis: &AnalysisResult,
    turn: Color,
    mode: SelectionMode,
    rng: &mut R,
) -> Result<(String, Score), CoreError> {
    let chosen: &Variation = match mode {
        SelectionMode::Best => analysis
            .best()
            .ok_or_else(|| CoreError::Selection("no variations to select from".into()))?,
        SelectionMode::Random => {
            if analysis.is_empty() {
                return Err(CoreError::Selection("no variations to select from".into()));
            }
            &analysis.variations[rng.gen_range(0..analysis.len())]
        }
        SelectionMode::Softmax => {
            let weights = softmax_weights(analysis, turn)?;
            let dist = WeightedIndex::new(&weights)
                .map_err(|e| CoreError::Selection(format!("invalid softmax weights: {e}")))?;
            &analysis.variations[dist.sample(rng)]
        }
    };

    if chosen.moves.is_empty() {
        return Err(CoreError::Selection("selected variation has no moves".into()));
    }

    Ok((chosen.first_move().to_string(), chosen.score))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn variation(mv: &str, score: Score) -> Variation {
        Variation {
            moves: vec![mv.to_string()],
            score,
        }
    }

    fn analysis(scores: &[(&str, Score)]) -> AnalysisResult {
        AnalysisResult::new(scores.iter().map(|(m, s)| variation(m, *s)).collect())
    }

    #[test]
    fn test_best_is_first_variation() {
        let a = analysis(&[
            ("e2e4", Score::Cp(40)),
            ("d2d4", Score::Cp(35)),
            ("g1f3", Score::Cp(20)),
        ]);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..10 {
            let (mv, score) = select(&a, Color::White, SelectionMode::Best, &mut rng).unwrap();
            assert_eq!(mv, "e2e4");
            assert_eq!(score, Score::Cp(40));
        }
    }

    #[test]
    fn test_random_picks_among_variations() {
        let a = analysis(&[("e2e4", Score::Cp(40)), ("d2d4", Score::Cp(35))]);
        let mut rng = StdRng::seed_from_u64(11);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..64 {
            let (mv, _) = select(&a, Color::Black, SelectionMode::Random, &mut rng).unwrap();
            assert!(mv == "e2e4" || mv == "d2d4");
            seen.insert(mv);
        }
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_softmax_weights_gate() {
        let a = analysis(&[
            ("e2e4", Score::Cp(0)),
            ("d2d4", Score::Cp(35)),
            ("g1f3", Score::Cp(0)),
            ("b1c3", Score::Mate(4)),
        ]);
        let weights = softmax_weights(&a, Color::White).unwrap();
        assert_eq!(weights, vec![0.5, 0.0, 0.5, 0.0]);
        let sum: f64 = weights.iter().sum();
        assert!((sum - 1.0).abs() <= 0.01);

        let black = softmax_weights(&a, Color::Black).unwrap();
        assert_eq!(black, weights);
    }

    #[test]
    fn test_softmax_only_samples_gated_variations() {
        let a = analysis(&[("e2e4", Score::Cp(-20)), ("d2d4", Score::Cp(0))]);
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..32 {
            let (mv, score) = select(&a, Color::White, SelectionMode::Softmax, &mut rng).unwrap();
            assert_eq!(mv, "d2d4");
            assert_eq!(score, Score::Cp(0));
        }
    }

    #[test]
    fn test_softmax_all_zero_weights_fails() {
        let a = analysis(&[("e2e4", Score::Cp(40)), ("d2d4", Score::Mate(2))]);
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            select(&a, Color::White, SelectionMode::Softmax, &mut rng),
            Err(CoreError::Selection(_))
        ));
    }

    #[test]
    fn test_empty_analysis_fails() {
        let a = AnalysisResult::default();
        let mut rng = StdRng::seed_from_u64(1);
        for mode in [SelectionMode::Best, SelectionMode::Random, SelectionMode::Softmax] {
            assert!(select(&a, Color::White, mode, &mut rng).is_err());
        }
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("Softmax".parse::<SelectionMode>(), Ok(SelectionMode::Softmax));
        assert_eq!("best".parse::<SelectionMode>(), Ok(SelectionMode::Best));
        assert!("greedy".parse::<SelectionMode>().is_err());
    }
}
